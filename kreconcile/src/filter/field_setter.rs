use serde::Deserialize;
use serde_yaml::Value;

use crate::{collection::ResourceCollection, fieldpath::FieldPath, serde_ex};

use super::target::{self, Target};

/// Sets the field at `fieldPath` to `value`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSetter {
    #[serde(with = "serde_ex::string")]
    field_path: FieldPath,
    value: Value,
    /// Create missing fields along the path.
    #[serde(default)]
    create: bool,
    #[serde(default)]
    target: Option<Target>,
}

impl FieldSetter {
    #[tracing::instrument(skip_all, fields(field_path = %self.field_path))]
    pub fn apply(&self, resources: &mut ResourceCollection) -> anyhow::Result<()> {
        let mut set = 0;
        for resource in resources.iter_mut() {
            if !target::selects(self.target.as_ref(), resource) {
                continue;
            }

            set += self
                .field_path
                .apply(resource.root_mut(), self.create, &mut |value| {
                    *value = self.value.clone();
                    Ok(())
                })
                .map_err(|err| err.context(format!("setting field on {resource}")))?;
        }

        tracing::debug!(set, "set fields");
        Ok(())
    }
}
