use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail, ensure};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::{
    error::{Error, Result},
    manifest::{Str, annotation},
    resource::value_type,
    yaml,
};

/// The conventional location of the specification, relative to the package root.
pub const SPEC_FILE_NAME: &str = "filter.yaml";

/// A document configuring the transform to run. `apiVersion` identifies the backend, `kind` the
/// variant, and every other field is configuration for the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    api_version: Str,
    kind: Str,
    document: Mapping,
    path: Option<PathBuf>,
}

impl Specification {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        let document = match value {
            Value::Mapping(document) => document,
            other => bail!("expected a mapping, found {}", value_type(&other)),
        };

        let field = |name: &str| -> anyhow::Result<Str> {
            match document.get(name) {
                None | Some(Value::Null) => Ok(Str::default()),
                Some(Value::String(s)) => Ok(s.as_str().into()),
                Some(other) => bail!("`{name}` must be a string, found {}", value_type(other)),
            }
        };

        Ok(Specification {
            api_version: field("apiVersion")?,
            kind: field("kind")?,
            document,
            path: None,
        })
    }

    /// Parse text containing exactly one document.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut documents = yaml::parse_stream(text)?;
        ensure!(
            documents.len() == 1,
            "expected exactly one document, found {}",
            documents.len()
        );
        Self::from_value(documents.remove(0))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::SpecNotFound {
                path: path.to_path_buf(),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|err| Error::SpecParse {
            path: Some(path.to_path_buf()),
            source: anyhow::Error::from(err).context("reading specification"),
        })?;

        let mut spec = Self::parse(&text).map_err(|source| Error::SpecParse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        spec.path = Some(path.to_path_buf());
        Ok(spec)
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn document(&self) -> &Mapping {
        &self.document
    }

    /// The file the specification was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The document handed to a function as its configuration, without administrative
    /// annotations.
    pub fn function_config(&self) -> Mapping {
        let mut config = self.document.clone();
        let Some(Value::Mapping(metadata)) = config.get_mut("metadata") else {
            return config;
        };

        if let Some(Value::Mapping(annotations)) = metadata.get_mut("annotations") {
            for key in annotation::ADMINISTRATIVE {
                annotations.shift_remove(*key);
            }
            if annotations.is_empty() {
                metadata.shift_remove("annotations");
            }
        }

        if metadata.is_empty() {
            config.shift_remove("metadata");
        }
        config
    }

    /// Deserialize the transform-specific fields, i.e. everything except `apiVersion`, `kind`
    /// and `metadata`.
    pub fn config<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let mut fields = self.document.clone();
        for key in ["apiVersion", "kind", "metadata"] {
            fields.shift_remove(key);
        }
        serde_yaml::from_value(Value::Mapping(fields)).context("parsing filter configuration")
    }
}

/// Pick the specification for a run: an explicit one, else the first of `paths`, else the
/// conventional file in `package`.
#[tracing::instrument(skip_all, fields(package = %package.display()))]
pub fn resolve(
    explicit: Option<&Specification>,
    paths: &[PathBuf],
    package: &Path,
) -> Result<Specification> {
    if let Some(spec) = explicit {
        tracing::debug!(kind = %spec.kind(), "using explicit specification");
        return Ok(spec.clone());
    }

    let path = match paths {
        [] => package.join(SPEC_FILE_NAME),
        [first, rest @ ..] => {
            if !rest.is_empty() {
                tracing::warn!(
                    ignored = rest.len(),
                    "only the first specification file is used"
                );
            }
            first.clone()
        }
    };

    let spec = Specification::load(&path)?;
    tracing::info!(
        path = %path.display(),
        api_version = %spec.api_version(),
        kind = %spec.kind(),
        "resolved specification"
    );
    Ok(spec)
}
