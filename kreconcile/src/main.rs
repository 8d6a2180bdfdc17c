use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use kreconcile::{CommandRuntime, Pipeline, Written};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run the package's filter over its resources.
    Run {
        /// The package directory.
        pkg: PathBuf,
        /// Read the filter specification from this file instead of `<PKG>/filter.yaml`.
        #[clap(long = "apis", value_name = "FILE")]
        apis: Vec<PathBuf>,
        /// Also load resources from this directory.
        #[clap(long, value_name = "DIR")]
        aux: Vec<PathBuf>,
        /// Print the resulting resources instead of updating the package.
        #[clap(long)]
        stdout: bool,
        /// Give up on a function after this many seconds.
        #[clap(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Container engine used to run functions.
        #[clap(long, value_name = "PROGRAM", default_value = "docker")]
        runtime: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            pkg,
            apis,
            aux,
            stdout,
            timeout,
            runtime,
        } => {
            let mut out = std::io::stdout();
            let mut pipeline =
                Pipeline::new(pkg).runtime(Arc::new(CommandRuntime::container(runtime)));
            for path in apis {
                pipeline = pipeline.spec_path(path);
            }
            for path in aux {
                pipeline = pipeline.aux_package(path);
            }
            if let Some(secs) = timeout {
                pipeline = pipeline.timeout(Duration::from_secs(secs));
            }

            if stdout {
                pipeline = pipeline.output(&mut out);
            }

            let outcome = match pipeline.run().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let stage = err.stage();
                    return Err(anyhow::Error::from(err).context(format!("{stage} stage failed")));
                }
            };

            if let Written::Files(files) = &outcome.written {
                for file in files {
                    eprintln!("updated {}", file.display());
                }
            }
        }
    }

    Ok(())
}
