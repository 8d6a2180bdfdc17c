mod delegated;
mod field_setter;
mod label;
mod target;
mod value_replacer;

pub use self::delegated::DelegatedFilter;
pub use self::field_setter::FieldSetter;
pub use self::label::LabelSetter;
pub use self::target::Target;
pub use self::value_replacer::ValueReplacer;

use std::{fmt, sync::Arc, time::Duration};

use regex::Regex;

use crate::{
    collection::ResourceCollection,
    error::{Error, Result},
    manifest::Str,
    runtime::{CommandRuntime, FunctionRuntime},
    specification::Specification,
};

/// A transformation of a whole resource collection, applied in place.
#[async_trait::async_trait]
pub trait Filter: Send {
    /// Name used in logs and errors.
    fn kind(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn filter(&mut self, resources: &mut ResourceCollection) -> Result<()>;
}

/// Maps a backend identifier and a specification to the filter to run. The default provider is
/// [`Registry::resolve_with_backend`]; tests and embedders can substitute their own.
pub type FilterProvider =
    Arc<dyn Fn(&str, &Specification) -> Result<Box<dyn Filter>> + Send + Sync>;

/// The filters built into the crate, selected by the specification's `kind`.
#[derive(Debug, Clone)]
pub enum Builtin {
    ValueReplacer(ValueReplacer),
    FieldSetter(FieldSetter),
    LabelSetter(LabelSetter),
}

impl Builtin {
    pub const KINDS: &'static [&'static str] = &["ValueReplacer", "FieldSetter", "LabelSetter"];

    /// Returns `None` if `spec` does not name a builtin kind.
    pub fn from_spec(spec: &Specification) -> Option<Result<Self>> {
        let builtin = match spec.kind() {
            "ValueReplacer" => spec
                .config()
                .and_then(ValueReplacer::validate)
                .map(Builtin::ValueReplacer),
            "FieldSetter" => spec.config().map(Builtin::FieldSetter),
            "LabelSetter" => spec.config().map(Builtin::LabelSetter),
            _ => return None,
        };

        Some(builtin.map_err(|source| Error::Config {
            kind: spec.kind().into(),
            source,
        }))
    }
}

#[async_trait::async_trait]
impl Filter for Builtin {
    fn kind(&self) -> &str {
        match self {
            Builtin::ValueReplacer(_) => "ValueReplacer",
            Builtin::FieldSetter(_) => "FieldSetter",
            Builtin::LabelSetter(_) => "LabelSetter",
        }
    }

    async fn filter(&mut self, resources: &mut ResourceCollection) -> Result<()> {
        let result = match self {
            Builtin::ValueReplacer(f) => f.apply(resources),
            Builtin::FieldSetter(f) => f.apply(resources),
            Builtin::LabelSetter(f) => f.apply(resources),
        };

        result.map_err(|source| Error::Execute {
            kind: self.kind().into(),
            source,
        })
    }
}

/// The outcome of resolving a specification against the [`Registry`].
#[derive(Debug)]
pub enum ResolvedFilter {
    Declarative(Builtin),
    Delegated(DelegatedFilter),
}

#[async_trait::async_trait]
impl Filter for ResolvedFilter {
    fn kind(&self) -> &str {
        match self {
            ResolvedFilter::Declarative(builtin) => builtin.kind(),
            ResolvedFilter::Delegated(delegated) => delegated.kind(),
        }
    }

    async fn filter(&mut self, resources: &mut ResourceCollection) -> Result<()> {
        match self {
            ResolvedFilter::Declarative(builtin) => builtin.filter(resources).await,
            ResolvedFilter::Delegated(delegated) => delegated.filter(resources).await,
        }
    }
}

/// Resolves specifications to filters. Delegated filters run on `runtime`.
#[derive(Clone)]
pub struct Registry {
    runtime: Arc<dyn FunctionRuntime>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(CommandRuntime::docker()))
    }
}

impl Registry {
    pub fn new(runtime: Arc<dyn FunctionRuntime>) -> Self {
        Self {
            runtime,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve using the specification's own `apiVersion` as the backend identifier.
    pub fn resolve(&self, spec: &Specification) -> Result<ResolvedFilter> {
        self.resolve_with_backend(spec.api_version(), spec)
    }

    /// A builtin when `kind` names one, otherwise a function run from the image `backend` with
    /// the specification as its configuration.
    #[tracing::instrument(skip_all, fields(backend = %backend, kind = %spec.kind()))]
    pub fn resolve_with_backend(
        &self,
        backend: &str,
        spec: &Specification,
    ) -> Result<ResolvedFilter> {
        if let Some(builtin) = Builtin::from_spec(spec) {
            tracing::debug!("resolved builtin filter");
            return builtin.map(ResolvedFilter::Declarative);
        }

        validate_image(backend).map_err(|source| Error::Config {
            kind: spec.kind().into(),
            source,
        })?;

        tracing::debug!("resolved function filter");
        Ok(ResolvedFilter::Delegated(DelegatedFilter::new(
            Str::from(backend),
            spec.function_config(),
            Arc::clone(&self.runtime),
            self.timeout,
        )))
    }

    pub fn provider(self) -> FilterProvider {
        Arc::new(move |backend: &str, spec: &Specification| {
            self.resolve_with_backend(backend, spec)
                .map(|filter| Box::new(filter) as Box<dyn Filter>)
        })
    }
}

fn validate_image(image: &str) -> anyhow::Result<()> {
    // [registry[:port]/]path[:tag][@digest]
    static IMAGE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(
            r"^(?:[a-zA-Z0-9.-]+(?::[0-9]+)?/)?[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*(?::[\w][\w.-]{0,127})?(?:@[a-z0-9]+:[a-fA-F0-9]+)?$",
        )
        .expect("valid image reference regex")
    });

    anyhow::ensure!(
        !image.is_empty(),
        "`apiVersion` must name a function image when `kind` is not one of {}",
        Builtin::KINDS.join(", ")
    );

    anyhow::ensure!(
        IMAGE.is_match(image),
        "`{image}` is not a valid image reference"
    );
    Ok(())
}
