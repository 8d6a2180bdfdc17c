use std::{fmt, path::PathBuf};

use crate::manifest::Str;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The pipeline stage an [`Error`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Resolve,
    Execute,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Resolve => write!(f, "resolve"),
            Stage::Execute => write!(f, "execute"),
            Stage::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load package contents at `{}`", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("no filter specification found at `{}`", .path.display())]
    SpecNotFound { path: PathBuf },

    #[error("invalid filter specification{}", origin(.path))]
    SpecParse {
        path: Option<PathBuf>,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration for filter `{kind}`")]
    Config {
        kind: Str,
        #[source]
        source: anyhow::Error,
    },

    #[error("filter `{kind}` failed")]
    Execute {
        kind: Str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to invoke function `{backend}`")]
    BackendInvocation {
        backend: Str,
        #[source]
        source: anyhow::Error,
    },

    #[error("function `{backend}` produced invalid output")]
    BackendOutput {
        backend: Str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write `{}`", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in `{}`", path.display()),
        None => String::new(),
    }
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::Load { .. } => Stage::Load,
            Error::SpecNotFound { .. } | Error::SpecParse { .. } | Error::Config { .. } => {
                Stage::Resolve
            }
            Error::Execute { .. }
            | Error::BackendInvocation { .. }
            | Error::BackendOutput { .. } => Stage::Execute,
            Error::Write { .. } => Stage::Write,
        }
    }
}
