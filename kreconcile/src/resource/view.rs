use serde_yaml::{Mapping, Value};

use super::Resource;

impl Resource {
    pub fn metadata(&self) -> Option<MetadataView<'_>> {
        self.root
            .get("metadata")
            .and_then(Value::as_mapping)
            .map(MetadataView)
    }

    pub fn labels(&self) -> Option<LabelsView<'_>> {
        self.metadata()?.labels()
    }

    pub fn annotations(&self) -> Option<AnnotationsView<'_>> {
        self.metadata()?.annotations()
    }

    pub fn make_metadata_mut(&mut self) -> anyhow::Result<MetadataViewMut<'_>> {
        let metadata = self
            .root
            .entry(Value::from("metadata"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if metadata.is_null() {
            *metadata = Value::Mapping(Mapping::new());
        }
        match metadata {
            Value::Mapping(metadata) => Ok(MetadataViewMut(metadata)),
            _ => anyhow::bail!("expected `metadata` to be a mapping"),
        }
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) -> anyhow::Result<()> {
        self.make_metadata_mut()?
            .make_mapping_mut("annotations")?
            .insert(Value::from(key), Value::String(value.into()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetadataView<'a>(&'a Mapping);

impl<'a> MetadataView<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn namespace(&self) -> Option<&'a str> {
        self.0.get("namespace").and_then(Value::as_str)
    }

    pub fn labels(&self) -> Option<LabelsView<'a>> {
        self.0
            .get("labels")
            .and_then(Value::as_mapping)
            .map(LabelsView)
    }

    pub fn annotations(&self) -> Option<AnnotationsView<'a>> {
        self.0
            .get("annotations")
            .and_then(Value::as_mapping)
            .map(AnnotationsView)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LabelsView<'a>(&'a Mapping);

impl<'a> LabelsView<'a> {
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationsView<'a>(&'a Mapping);

impl<'a> AnnotationsView<'a> {
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub struct MetadataViewMut<'a>(&'a mut Mapping);

impl MetadataViewMut<'_> {
    pub fn make_mapping_mut(&mut self, key: &str) -> anyhow::Result<&mut Mapping> {
        let value = self
            .0
            .entry(Value::from(key))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        // `labels:` with no value parses as null
        if value.is_null() {
            *value = Value::Mapping(Mapping::new());
        }
        match value {
            Value::Mapping(mapping) => Ok(mapping),
            _ => anyhow::bail!("expected `metadata.{key}` to be a mapping"),
        }
    }
}
