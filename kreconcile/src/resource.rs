mod view;

pub use self::view::{AnnotationsView, LabelsView, MetadataView, MetadataViewMut};

use std::{borrow::Cow, fmt, path::PathBuf};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{manifest::Str, yaml};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct Gvk {
    pub group: Str,
    pub version: Str,
    pub kind: Str,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

impl Gvk {
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = api_version
            .split_once('/')
            .map_or(("".into(), api_version.into()), |(g, v)| (g.into(), v.into()));
        Gvk {
            group,
            version,
            kind: kind.into(),
        }
    }
}

/// Where a resource was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provenance {
    /// The package root the file was found under.
    pub root: PathBuf,
    /// File path relative to `root`.
    pub path: PathBuf,
    /// Position among the documents of the file.
    pub index: usize,
}

impl Provenance {
    pub fn file(&self) -> PathBuf {
        self.root.join(&self.path)
    }
}

/// The text a resource was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Source {
    pub leading: String,
    pub body: String,
    pub value: Mapping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    root: Mapping,
    provenance: Option<Provenance>,
    source: Option<Source>,
}

impl Resource {
    pub fn new(root: Mapping) -> Self {
        Resource {
            root,
            provenance: None,
            source: None,
        }
    }

    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Mapping(root) => Ok(Resource::new(root)),
            other => bail!("expected a resource mapping, found {}", value_type(&other)),
        }
    }

    /// Build a resource from a document of a loaded file, remembering its text and origin.
    pub(crate) fn from_document(
        document: yaml::Document,
        provenance: Provenance,
    ) -> anyhow::Result<Self> {
        let mut resource = Resource::from_value(document.value)?;
        resource.source = Some(Source {
            leading: document.leading,
            body: document.body,
            value: resource.root.clone(),
        });
        resource.provenance = Some(provenance);
        Ok(resource)
    }

    pub fn api_version(&self) -> &str {
        self.root
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.root
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(self.api_version(), self.kind())
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata()?.name()
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    pub fn into_root(self) -> Mapping {
        self.root
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub(crate) fn set_provenance(&mut self, provenance: Option<Provenance>) {
        self.provenance = provenance;
    }

    pub(crate) fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub(crate) fn set_source(&mut self, source: Option<Source>) {
        self.source = source;
    }

    /// Whether the resource differs from the document it was loaded from.
    /// Resources created by a filter are always considered modified.
    pub fn is_modified(&self) -> bool {
        self.source
            .as_ref()
            .is_none_or(|source| source.value != self.root)
    }

    /// The document text without any leading separators or comments.
    ///
    /// A modified document keeps the text of everything the modification did not touch. It is
    /// re-serialized entirely only when its text cannot be edited in place.
    pub fn body(&self) -> anyhow::Result<Cow<'_, str>> {
        let Some(source) = &self.source else {
            return Ok(Cow::Owned(yaml::to_string(&self.root)?));
        };
        if !self.is_modified() {
            return Ok(Cow::Borrowed(&source.body));
        }
        match yaml::patch(&source.body, &source.value, &self.root) {
            Some(text) => Ok(Cow::Owned(text)),
            None => {
                tracing::debug!(resource = %self, "re-serializing modified document");
                Ok(Cow::Owned(yaml::to_string(&self.root)?))
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gvk())?;
        if let Some(namespace) = self.metadata().and_then(|metadata| metadata.namespace()) {
            write!(f, "/{namespace}")?;
        }
        if let Some(name) = self.name() {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}

pub(crate) fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
