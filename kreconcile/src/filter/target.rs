use indexmap::IndexMap;
use serde::Deserialize;

use crate::{manifest::Str, resource::Resource};

/// Restricts a filter to the resources matching every given criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Target {
    #[serde(default)]
    pub group: Option<Str>,
    #[serde(default)]
    pub version: Option<Str>,
    #[serde(default)]
    pub kind: Option<Str>,
    #[serde(default)]
    pub name: Option<Str>,
    /// Every entry must be present in `metadata.labels` with the same value.
    #[serde(default)]
    pub labels: IndexMap<Str, Str>,
}

impl Target {
    pub fn matches(&self, resource: &Resource) -> bool {
        let gvk = resource.gvk();
        let matches = |expected: &Option<Str>, actual: &str| {
            expected.as_ref().is_none_or(|expected| expected.as_str() == actual)
        };
        if !matches(&self.group, &gvk.group)
            || !matches(&self.version, &gvk.version)
            || !matches(&self.kind, &gvk.kind)
            || !matches(&self.name, resource.name().unwrap_or_default())
        {
            return false;
        }

        if self.labels.is_empty() {
            return true;
        }
        let Some(labels) = resource.labels() else { return false };
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value.as_str()))
    }
}

/// Whether `target`, if any, selects `resource`.
pub(super) fn selects(target: Option<&Target>, resource: &Resource) -> bool {
    target.is_none_or(|target| target.matches(resource))
}
