use crate::config::ValidatedConfig;
use crate::{FwiError, FwiResult};
use std::fs::{self, File};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Launches external executables (solver, kernel utilities) as child
/// processes. Exit status is the only success signal.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    launcher: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new(launcher: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { launcher, timeout }
    }

    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(config.mpi_exec.clone(), config.tool_timeout)
    }

    /// Run `program args..` in `cwd`, stdout to `log` (discarded when `None`).
    pub fn run<S: AsRef<str>>(
        &self,
        cwd: &Path,
        program: &Path,
        args: &[S],
        log: Option<&Path>,
    ) -> FwiResult<()> {
        let program_name = program.display().to_string();
        let mut command = match self.launcher.split_first() {
            Some((launcher, launcher_args)) => {
                let mut c = Command::new(launcher);
                c.args(launcher_args).arg(program);
                c
            }
            None => Command::new(program),
        };
        command.current_dir(cwd).args(args.iter().map(|a| a.as_ref())).stdin(Stdio::null());

        match log {
            Some(log_path) => {
                if let Some(parent) = log_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                command.stdout(Stdio::from(File::create(log_path)?));
            }
            None => {
                command.stdout(Stdio::null());
            }
        }

        debug!(program = %program_name, cwd = %cwd.display(), "launching tool");
        let child = command.spawn()?;
        let status = match self.timeout {
            Some(limit) => wait_with_timeout(child, limit, &program_name)?,
            None => {
                let mut child = child;
                child.wait()?
            }
        };

        if status.success() {
            Ok(())
        } else {
            warn!(program = %program_name, code = ?status.code(), "tool failed");
            Err(FwiError::ToolFailed { program: program_name, status: status.code() })
        }
    }
}

fn wait_with_timeout(
    mut child: Child,
    limit: Duration,
    program: &str,
) -> FwiResult<std::process::ExitStatus> {
    match child.wait_timeout(limit)? {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(program, secs = limit.as_secs(), "tool timed out");
            Err(FwiError::ToolTimeout { program: program.to_string(), secs: limit.as_secs() })
        }
    }
}
