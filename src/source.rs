//! External data source invocation
//!
//! [`DataSource`] is the seam between the orchestrator and whatever produces
//! snapshots. [`CommandSource`] runs an external program (normally `btcli`)
//! once per call and hands back its stdout.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::{ID_PLACEHOLDER, SourceConfig};
use crate::error::FetchError;
use crate::types::Identifier;

/// A source of per-identifier snapshots
///
/// Snapshots are returned as the exact bytes the source produced, so they can
/// be persisted verbatim. Classifying them as empty or usable is the caller's
/// job.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the snapshot for one identifier within `timeout`
    async fn fetch(&self, id: Identifier, timeout: Duration) -> Result<Vec<u8>, FetchError>;

    /// Fetch the listing of available identifiers within `timeout`
    async fn list(&self, timeout: Duration) -> Result<String, FetchError>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Data source backed by an external command
///
/// # Examples
///
/// ```no_run
/// use netuid_fetch::config::SourceConfig;
/// use netuid_fetch::source::{CommandSource, DataSource};
/// use netuid_fetch::types::Identifier;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = CommandSource::from_config(&SourceConfig::default());
/// let payload = source.fetch(Identifier(1), Duration::from_secs(20)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CommandSource {
    program: String,
    fetch_args: Vec<String>,
    list_args: Vec<String>,
}

impl CommandSource {
    /// Create a command source with explicit argument templates
    ///
    /// Every occurrence of `{id}` in `fetch_args` is replaced by the identifier.
    pub fn new(program: impl Into<String>, fetch_args: Vec<String>, list_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            fetch_args,
            list_args,
        }
    }

    /// Create a command source from configuration
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.fetch_args.clone(),
            config.list_args.clone(),
        )
    }

    /// Program this source invokes
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Find the program on disk or in PATH
    ///
    /// Uses the `which` crate, so the result matches what spawning would find.
    pub fn locate(&self) -> Result<PathBuf, FetchError> {
        which::which(&self.program).map_err(|_| FetchError::ToolMissing {
            program: self.program.clone(),
        })
    }

    /// Arguments for fetching `id`
    pub fn fetch_command_args(&self, id: Identifier) -> Vec<String> {
        let id = id.to_string();
        self.fetch_args
            .iter()
            .map(|arg| arg.replace(ID_PLACEHOLDER, &id))
            .collect()
    }

    /// Run the program once and return raw stdout, classifying every failure
    async fn run(&self, args: &[String], timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            // A timed-out call drops the future; the child must not outlive it
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::ToolMissing {
                    program: self.program.clone(),
                });
            }
            Ok(Err(e)) => {
                return Err(FetchError::Launch {
                    program: self.program.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        if !output.status.success() {
            return Err(FetchError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl DataSource for CommandSource {
    async fn fetch(&self, id: Identifier, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let args = self.fetch_command_args(id);
        self.run(&args, timeout).await
    }

    async fn list(&self, timeout: Duration) -> Result<String, FetchError> {
        // Only parsed for identifiers, never persisted
        let stdout = self.run(&self.list_args, timeout).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
