use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::{collection::ResourceCollection, manifest::Str};

use super::target::{self, Target};

/// Adds `labels` to `metadata.labels`, overwriting existing values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabelSetter {
    labels: IndexMap<Str, Str>,
    #[serde(default)]
    target: Option<Target>,
}

impl LabelSetter {
    #[tracing::instrument(skip_all)]
    pub fn apply(&self, resources: &mut ResourceCollection) -> anyhow::Result<()> {
        if self.labels.is_empty() {
            return Ok(());
        }

        for resource in resources.iter_mut() {
            if !target::selects(self.target.as_ref(), resource) {
                continue;
            }

            let mut metadata = resource.make_metadata_mut()?;
            let labels = metadata.make_mapping_mut("labels")?;
            for (key, value) in &self.labels {
                labels.insert(
                    Value::String(key.to_string()),
                    Value::String(value.to_string()),
                );
            }
        }

        Ok(())
    }
}
