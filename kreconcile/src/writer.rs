use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use indexmap::IndexMap;

use crate::{
    collection::ResourceCollection,
    error::{Error, Result},
    resource::Resource,
    yaml,
};

/// Where new resources go when the package had no files to append them to.
pub const NEW_RESOURCES_FILE: &str = "resources.yaml";

/// What a write touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    /// Files rewritten in place, in traversal order. Unchanged files are not included.
    Files(Vec<PathBuf>),
    /// Everything went to the supplied sink.
    Stream,
}

/// Write `resources` back to the files they were loaded from.
///
/// `files` is the file table produced by the loader. Resources without a file of their own are
/// appended to the last file under `package`. Every file's contents are rendered before anything
/// is written, and each file is replaced atomically.
#[tracing::instrument(skip_all, fields(package = %package.display()))]
pub fn write_in_place(
    package: &Path,
    files: &IndexMap<PathBuf, String>,
    resources: &ResourceCollection,
) -> Result<Vec<PathBuf>> {
    // New resources belong to the package, never to an auxiliary root.
    let fallback = files
        .keys()
        .rev()
        .find(|file| file.starts_with(package))
        .cloned()
        .unwrap_or_else(|| package.join(NEW_RESOURCES_FILE));

    let mut groups = files
        .keys()
        .map(|file| (file.clone(), Vec::new()))
        .collect::<IndexMap<PathBuf, Vec<&Resource>>>();

    for resource in resources {
        let file = resource
            .provenance()
            .map(|provenance| provenance.file())
            .filter(|file| files.contains_key(file))
            .unwrap_or_else(|| fallback.clone());
        groups.entry(file).or_default().push(resource);
    }

    let mut rendered = Vec::new();
    for (file, group) in &groups {
        if group.is_empty() {
            tracing::warn!(
                path = %file.display(),
                "all resources of the file were removed, leaving it untouched"
            );
            continue;
        }

        let trailing = files.get(file).map_or("", String::as_str);
        let text = render(file, group, trailing).map_err(|source| Error::Write {
            path: file.clone(),
            source,
        })?;

        if std::fs::read_to_string(file).is_ok_and(|current| current == text) {
            tracing::debug!(path = %file.display(), "file unchanged");
            continue;
        }
        rendered.push((file, text));
    }

    let mut written = Vec::with_capacity(rendered.len());
    for (file, text) in rendered {
        persist(file, &text).map_err(|source| Error::Write {
            path: file.clone(),
            source,
        })?;
        tracing::debug!(path = %file.display(), "wrote file");
        written.push(file.clone());
    }

    tracing::info!(files = written.len(), "wrote resources in place");
    Ok(written)
}

/// Write every resource to `sink` as one stream.
#[tracing::instrument(skip_all)]
pub fn write_stream(resources: &ResourceCollection, sink: &mut dyn Write) -> Result<()> {
    let stream_error = |source| Error::Write {
        path: PathBuf::from("<stream>"),
        source,
    };

    let text = resources.to_stream().map_err(stream_error)?;
    sink.write_all(text.as_bytes())
        .and_then(|()| sink.flush())
        .context("writing to output stream")
        .map_err(stream_error)?;

    tracing::info!(resources = resources.len(), "wrote resource stream");
    Ok(())
}

/// Render the resources of one file. `file` is the path the text is destined for.
fn render(file: &Path, resources: &[&Resource], trailing: &str) -> anyhow::Result<String> {
    let mut buf = String::new();
    for (position, resource) in resources.iter().enumerate() {
        // Leading text only belongs to the file it was read from.
        let original = resource
            .provenance()
            .filter(|provenance| provenance.file() == file)
            .zip(resource.source());

        let leading = match original {
            Some((provenance, source)) if position == 0 && provenance.index > 0 => {
                yaml::without_separators(&source.leading)
            }
            Some((_, source)) => source.leading.clone(),
            None => String::new(),
        };

        if position > 0 && !leading.lines().any(yaml::is_separator) {
            yaml::push_line_aligned(&mut buf, yaml::SEPARATOR);
        }
        yaml::push_line_aligned(&mut buf, &leading);
        let body = resource
            .body()
            .with_context(|| format!("serializing {resource}"))?;
        yaml::push_line_aligned(&mut buf, &body);
    }

    if !trailing.is_empty() {
        yaml::push_line_aligned(&mut buf, trailing);
    }
    Ok(buf)
}

fn persist(path: &Path, text: &str) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("`{}` has no parent directory", path.display()))?;
    let mut file = tempfile::NamedTempFile::new_in(dir).context("creating temporary file")?;
    // Temporary files are created private, keep the mode of the file being replaced.
    if let Ok(metadata) = std::fs::metadata(path) {
        file.as_file()
            .set_permissions(metadata.permissions())
            .context("copying permissions")?;
    }
    file.write_all(text.as_bytes())
        .context("writing temporary file")?;
    file.persist(path).context("replacing file")?;
    Ok(())
}
