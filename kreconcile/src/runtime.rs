//! Execution of functions in external processes.

use std::{ffi::OsString, io, process::Stdio, time::Instant};

use anyhow::{Context, bail};
use tokio::io::AsyncWriteExt as _;

/// Runs a function identified by an image reference, feeding it `input` on stdin and returning
/// everything it wrote to stdout. A non-zero exit status is an error.
#[async_trait::async_trait]
pub trait FunctionRuntime: Send + Sync {
    async fn run(&self, image: &str, input: Vec<u8>) -> anyhow::Result<Vec<u8>>;
}

/// Runs `program args... <image>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRuntime {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandRuntime {
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A container engine with a docker compatible CLI, e.g. `docker` or `podman`.
    pub fn container(engine: impl Into<OsString>) -> Self {
        Self::new(
            engine,
            [
                "run",
                "--rm",
                "-i",
                "--network",
                "none",
                "--user",
                "nobody",
                "--security-opt=no-new-privileges",
            ],
        )
    }

    pub fn docker() -> Self {
        Self::container("docker")
    }
}

impl Default for CommandRuntime {
    fn default() -> Self {
        Self::docker()
    }
}

#[async_trait::async_trait]
impl FunctionRuntime for CommandRuntime {
    #[tracing::instrument(skip_all, fields(image = %image, program = ?self.program))]
    async fn run(&self, image: &str, input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(image)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut proc = cmd
            .spawn()
            .with_context(|| format!("spawn function command `{}`", self.program.to_string_lossy()))?;

        let now = Instant::now();

        // Feed stdin while collecting the output so neither side blocks on a full pipe.
        let mut stdin = proc.stdin.take().context("function stdin is not piped")?;
        let write = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(write, proc.wait_with_output());
        let output = output.context("wait for function process")?;

        if !output.status.success() {
            bail!(
                "function exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        match written {
            // The function may legitimately finish without consuming its input.
            Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
                return Err(err).context("write to function stdin");
            }
            _ => {}
        }

        tracing::info!(duration = ?now.elapsed(), cmd = ?cmd.as_std(), "executed function");

        Ok(output.stdout)
    }
}
