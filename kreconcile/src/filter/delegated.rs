use std::{
    fmt,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::{
    collection::ResourceCollection,
    error::{Error, Result},
    manifest::{Str, annotation},
    reslist::ResourceList,
    resource::{Provenance, Resource, Source},
    runtime::FunctionRuntime,
    yaml,
};

use super::Filter;

/// Runs a function image over the whole collection.
///
/// Resources are annotated with their provenance before being sent, and the annotations are used
/// to recover it from the function's output.
pub struct DelegatedFilter {
    backend: Str,
    config: Mapping,
    runtime: Arc<dyn FunctionRuntime>,
    timeout: Option<Duration>,
}

impl fmt::Debug for DelegatedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedFilter")
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DelegatedFilter {
    pub fn new(
        backend: Str,
        config: Mapping,
        runtime: Arc<dyn FunctionRuntime>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            config,
            runtime,
            timeout,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn config(&self) -> &Mapping {
        &self.config
    }

    async fn invoke(&self, input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let run = self.runtime.run(&self.backend, input);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .with_context(|| format!("timed out after {timeout:?}"))?,
            None => run.await,
        }
    }

    fn invocation_error(&self, source: anyhow::Error) -> Error {
        Error::BackendInvocation {
            backend: self.backend.clone(),
            source,
        }
    }

    fn output_error(&self, source: anyhow::Error) -> Error {
        Error::BackendOutput {
            backend: self.backend.clone(),
            source,
        }
    }
}

/// What a resource looked like before it was handed to the function.
struct Original {
    provenance: Option<Provenance>,
    source: Option<Source>,
    /// The `metadata` entry, if there was one.
    metadata: Option<Value>,
}

#[derive(Default)]
struct Originals {
    /// Keyed by the `path` and `index` annotations, position is the `id` annotation.
    table: IndexMap<(String, String), Original>,
}

impl Originals {
    /// Annotate `resource` so it can be recognised in the output.
    fn annotate(&mut self, resource: &mut Resource, package: Option<&Path>) -> anyhow::Result<()> {
        let id = self.table.len();
        let (path, index) = match resource.provenance() {
            Some(provenance) => {
                let path = if package == Some(provenance.root.as_path()) {
                    provenance.path.clone()
                } else {
                    provenance.file()
                };
                (display_path(&path), provenance.index.to_string())
            }
            None => (String::new(), id.to_string()),
        };

        let original = Original {
            provenance: resource.provenance().cloned(),
            source: resource.source().cloned(),
            metadata: resource.root().get("metadata").cloned(),
        };

        if resource.provenance().is_some() {
            resource.set_annotation(annotation::PATH, path.clone())?;
            resource.set_annotation(annotation::INDEX, index.clone())?;
        }
        resource.set_annotation(annotation::ID, id.to_string())?;
        self.table.insert((path, index), original);
        Ok(())
    }

    /// Strip the annotations from `resource` and restore what is known about its origin.
    fn restore(&self, resource: &mut Resource) {
        let get = |resource: &Resource, key: &str| {
            resource
                .annotations()
                .and_then(|annotations| annotations.get(key))
                .map(str::to_owned)
        };

        let id = get(resource, annotation::ID);
        let path = get(resource, annotation::PATH);
        let index = get(resource, annotation::INDEX);

        let original = id
            .and_then(|id| id.parse::<usize>().ok())
            .and_then(|id| self.table.get_index(id))
            .map(|(_, original)| original)
            .or_else(|| self.table.get(&(path?, index?)));

        strip_annotations(resource, original);

        if let Some(original) = original {
            resource.set_provenance(original.provenance.clone());
            resource.set_source(original.source.clone());
        }
    }
}

/// Remove the administrative annotations. The `annotations` and `metadata` entries they leave
/// empty are put back the way they were, or removed if the resource did not have them.
fn strip_annotations(resource: &mut Resource, original: Option<&Original>) {
    let original_metadata = original.and_then(|original| original.metadata.as_ref());
    let original_annotations = original_metadata.and_then(|metadata| metadata.get("annotations"));

    let root = resource.root_mut();
    let Some(Value::Mapping(metadata)) = root.get_mut("metadata") else {
        return;
    };
    if let Some(Value::Mapping(annotations)) = metadata.get_mut("annotations") {
        for key in annotation::ADMINISTRATIVE {
            annotations.shift_remove(*key);
        }
        if annotations.is_empty() {
            restore_empty(metadata, "annotations", original_annotations);
        }
    }
    if metadata.is_empty() {
        restore_empty(root, "metadata", original_metadata);
    }
}

fn restore_empty(mapping: &mut Mapping, key: &str, original: Option<&Value>) {
    let empty = |value: &&Value| value.is_null() || value.as_mapping().is_some_and(Mapping::is_empty);
    match original.filter(empty) {
        Some(value) => {
            mapping.insert(Value::from(key), value.clone());
        }
        None => {
            mapping.shift_remove(key);
        }
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[async_trait::async_trait]
impl Filter for DelegatedFilter {
    fn kind(&self) -> &str {
        &self.backend
    }

    #[tracing::instrument(skip_all, fields(backend = %self.backend))]
    async fn filter(&mut self, resources: &mut ResourceCollection) -> Result<()> {
        let now = Instant::now();
        let package = resources
            .iter()
            .find_map(|resource| resource.provenance())
            .map(|provenance| provenance.root.clone());

        let mut originals = Originals::default();
        let mut items = Vec::with_capacity(resources.len());
        for mut resource in std::mem::take(resources) {
            originals
                .annotate(&mut resource, package.as_deref())
                .map_err(|err| self.invocation_error(err.context("annotating resources")))?;
            items.push(Value::Mapping(resource.into_root()));
        }

        let input = yaml::to_string(&ResourceList::new(self.config.clone(), items))
            .map_err(|err| self.invocation_error(err))?;

        let output = self
            .invoke(input.into_bytes())
            .await
            .map_err(|err| self.invocation_error(err))?;

        let items = ResourceList::parse_output(output).map_err(|err| self.output_error(err))?;

        for (i, item) in items.into_iter().enumerate() {
            let mut resource = Resource::from_value(item)
                .with_context(|| format!("item {i}"))
                .map_err(|err| self.output_error(err))?;
            originals.restore(&mut resource);
            resources.push(resource);
        }

        tracing::info!(
            duration = ?now.elapsed(),
            resources = resources.len(),
            "function completed"
        );

        Ok(())
    }
}
