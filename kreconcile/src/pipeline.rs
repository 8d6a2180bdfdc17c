use std::{
    fmt,
    io::Write,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use crate::{
    error::Result,
    filter::{FilterProvider, Registry},
    loader::{self, Loaded},
    runtime::{CommandRuntime, FunctionRuntime},
    specification::{self, Specification},
    writer::{self, Written},
};

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Number of resources after the filter ran.
    pub resources: usize,
    pub written: Written,
}

/// A single resolve, load, filter and write pass over a package.
///
/// ```no_run
/// # async fn run() -> kreconcile::Result<()> {
/// let outcome = kreconcile::Pipeline::new("path/to/package").run().await?;
/// println!("{} resources", outcome.resources);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<'a> {
    package: PathBuf,
    aux_packages: Vec<PathBuf>,
    spec_paths: Vec<PathBuf>,
    specification: Option<Specification>,
    output: Option<&'a mut (dyn Write + Send)>,
    filter_provider: Option<FilterProvider>,
    runtime: Arc<dyn FunctionRuntime>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("package", &self.package)
            .field("aux_packages", &self.aux_packages)
            .field("spec_paths", &self.spec_paths)
            .field("specification", &self.specification)
            .field("stream", &self.output.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(package: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            aux_packages: Vec::new(),
            spec_paths: Vec::new(),
            specification: None,
            output: None,
            filter_provider: None,
            runtime: Arc::new(CommandRuntime::docker()),
            timeout: None,
        }
    }

    /// Also load resources from `path`, after those of the package.
    pub fn aux_package(mut self, path: impl Into<PathBuf>) -> Self {
        self.aux_packages.push(path.into());
        self
    }

    /// Read the specification from a file instead of the package. Only the first one added is
    /// used.
    pub fn spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec_paths.push(path.into());
        self
    }

    /// Use `spec` as is, ignoring any specification files.
    pub fn specification(mut self, spec: Specification) -> Self {
        self.specification = Some(spec);
        self
    }

    /// Write the result to `sink` as one stream instead of updating the package.
    pub fn output(mut self, sink: &'a mut (dyn Write + Send)) -> Self {
        self.output = Some(sink);
        self
    }

    /// Replace the default way of turning a specification into a filter.
    pub fn filter_provider(mut self, provider: FilterProvider) -> Self {
        self.filter_provider = Some(provider);
        self
    }

    /// The runtime used to run functions, `docker` by default.
    pub fn runtime(mut self, runtime: Arc<dyn FunctionRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Give up on a function after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[tracing::instrument(skip_all, fields(package = %self.package.display()))]
    pub async fn run(self) -> Result<Outcome> {
        let spec = specification::resolve(
            self.specification.as_ref(),
            &self.spec_paths,
            &self.package,
        )?;

        let provider = match self.filter_provider {
            Some(provider) => provider,
            None => Registry::new(self.runtime)
                .with_timeout(self.timeout)
                .provider(),
        };
        let mut filter = provider(spec.api_version(), &spec)?;

        let Loaded {
            mut resources,
            files,
        } = loader::load(&self.package, &self.aux_packages)?;

        tracing::info!(filter = %filter.kind(), resources = resources.len(), "running filter");
        filter.filter(&mut resources).await?;

        let written = match self.output {
            Some(sink) => {
                writer::write_stream(&resources, sink)?;
                Written::Stream
            }
            None => Written::Files(writer::write_in_place(&self.package, &files, &resources)?),
        };

        Ok(Outcome {
            resources: resources.len(),
            written,
        })
    }
}
