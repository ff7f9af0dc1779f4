use crate::tool_runner::ToolRunner;
use crate::FwiResult;
use std::path::{Path, PathBuf};

/// Data processing collaborator: owns the trace format, the misfit and the
/// adjoint source construction.
pub trait Preprocessor {
    /// Compute residuals into `{workdir}/residuals` and adjoint sources into
    /// `{workdir}/traces/adj` from `traces/obs` and `traces/syn`.
    fn prepare_eval_grad(&self, workdir: &Path) -> FwiResult<()>;

    /// Prepare adjoint sources for a Hessian-vector product from `traces/lcg`.
    fn prepare_apply_hess(&self, workdir: &Path) -> FwiResult<()>;

    /// Write all-zero traces for `channel` into `adj_dir`, shaped like the
    /// observed traces in `obs_dir`.
    fn write_zero_traces(&self, obs_dir: &Path, adj_dir: &Path, channel: char) -> FwiResult<()>;
}

/// Preprocessing delegated to an external program invoked as
/// `{program} <subcommand> <args..>`.
#[derive(Debug, Clone)]
pub struct ExternalPreprocessor {
    program: PathBuf,
    runner: ToolRunner,
}

impl ExternalPreprocessor {
    /// The preprocessing program runs serially, so no MPI launcher is used.
    pub fn new(program: impl Into<PathBuf>, runner: ToolRunner) -> Self {
        Self { program: program.into(), runner }
    }

    fn invoke(&self, workdir: &Path, args: &[String]) -> FwiResult<()> {
        let log = workdir.join("OUTPUT_FILES").join("output_preprocess.txt");
        self.runner.run(workdir, &self.program, args, Some(&log))
    }
}

impl Preprocessor for ExternalPreprocessor {
    fn prepare_eval_grad(&self, workdir: &Path) -> FwiResult<()> {
        self.invoke(workdir, &["prepare-eval-grad".to_string(), workdir.display().to_string()])
    }

    fn prepare_apply_hess(&self, workdir: &Path) -> FwiResult<()> {
        self.invoke(workdir, &["prepare-apply-hess".to_string(), workdir.display().to_string()])
    }

    fn write_zero_traces(&self, obs_dir: &Path, adj_dir: &Path, channel: char) -> FwiResult<()> {
        let workdir = obs_dir.parent().and_then(Path::parent).unwrap_or(obs_dir);
        self.invoke(
            workdir,
            &[
                "zero-traces".to_string(),
                obs_dir.display().to_string(),
                adj_dir.display().to_string(),
                channel.to_string(),
            ],
        )
    }
}
