use std::path::{Path, PathBuf};

use anyhow::{Context as _, ensure};
use indexmap::IndexMap;
use walkdir::{DirEntry, WalkDir};

use crate::{
    collection::ResourceCollection,
    error::{Error, Result},
    resource::{Provenance, Resource},
    specification::SPEC_FILE_NAME,
    yaml,
};

/// The contents of a package and its auxiliary packages.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub resources: ResourceCollection,
    /// Every file that contained at least one document, in traversal order, mapped to the text
    /// following its last document.
    pub files: IndexMap<PathBuf, String>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Load every YAML document under `package`, then under each of `aux`.
#[tracing::instrument(skip_all, fields(package = %package.display()))]
pub fn load(package: &Path, aux: &[PathBuf]) -> Result<Loaded> {
    let mut loaded = Loaded::default();
    load_root(package, true, &mut loaded).map_err(|source| Error::Load {
        path: package.to_path_buf(),
        source,
    })?;

    for root in aux {
        load_root(root, false, &mut loaded).map_err(|source| Error::Load {
            path: root.clone(),
            source,
        })?;
    }

    tracing::info!(
        resources = loaded.resources.len(),
        files = loaded.files.len(),
        "loaded resources"
    );
    Ok(loaded)
}

fn load_root(root: &Path, is_package: bool, loaded: &mut Loaded) -> anyhow::Result<()> {
    ensure!(root.is_dir(), "not a directory");

    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in entries {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_yaml(entry.path()) {
            continue;
        }

        if is_package && entry.depth() == 1 && entry.file_name() == SPEC_FILE_NAME {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root)?.to_path_buf();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading `{}`", path.display()))?;
        let file = yaml::split(&text).with_context(|| format!("parsing `{}`", path.display()))?;

        if file.documents.is_empty() {
            tracing::debug!(path = %relative.display(), "skipping file without documents");
            continue;
        }

        tracing::debug!(
            path = %relative.display(),
            documents = file.documents.len(),
            "loaded file"
        );

        for (index, document) in file.documents.into_iter().enumerate() {
            let provenance = Provenance {
                root: root.to_path_buf(),
                path: relative.clone(),
                index,
            };
            let resource = Resource::from_document(document, provenance)
                .with_context(|| format!("document {index} of `{}`", path.display()))?;
            loaded.resources.push(resource);
        }
        loaded.files.insert(path.to_path_buf(), file.trailing);
    }

    Ok(())
}
