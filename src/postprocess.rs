//! Kernel postprocessing over the shared kernel directory: summation across
//! sources, Gaussian smoothing and clipping, each a wrapper over a solver
//! utility.
//!
//! Smoothing and clipping write `*_smooth` / `*_clip` files next to their
//! inputs. Afterwards the inputs are moved to a `_nosmooth` / `_noclip`
//! sibling and the outputs take over the canonical names, so later stages
//! never need to know which steps already ran.
//!
//! A tool failing part way through the parameter loop leaves the directory
//! with some parameters processed and others not; nothing is rolled back.

use crate::config::ValidatedConfig;
use crate::fs_ops;
use crate::parameters::ParameterSet;
use crate::tool_runner::ToolRunner;
use crate::{FwiError, FwiResult};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SUM_DIR: &str = "sum";
const MANIFEST: &str = "kernel_paths";

pub struct KernelPostprocessor {
    parameters: ParameterSet,
    bin_dir: PathBuf,
    scratch: PathBuf,
    runner: ToolRunner,
}

impl KernelPostprocessor {
    /// `scratch` receives the manifest and tool logs.
    pub fn new(
        parameters: ParameterSet,
        bin_dir: impl Into<PathBuf>,
        scratch: impl Into<PathBuf>,
        runner: ToolRunner,
    ) -> Self {
        Self {
            parameters,
            bin_dir: bin_dir.into(),
            scratch: scratch.into(),
            runner,
        }
    }

    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(
            config.parameters.clone(),
            &config.paths.specfem_bin,
            config.paths.solver.join("postprocess"),
            ToolRunner::from_config(config),
        )
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.scratch.join("OUTPUT_FILES").join(name)
    }

    /// Sum per-source kernels under `path` into `{path}/sum`.
    pub fn combine(&self, path: &Path) -> FwiResult<()> {
        require_dir(path)?;
        let sources: Vec<PathBuf> = fs_ops::list_subdirs(path)?
            .into_iter()
            .filter(|d| !is_sum_dir(d))
            .collect();
        if sources.is_empty() {
            return Err(FwiError::MissingOutput(format!(
                "no per-source kernel directories under {}",
                path.display()
            )));
        }

        fs::create_dir_all(&self.scratch)?;
        let manifest = self.scratch.join(MANIFEST);
        let listing = sources.iter().map(|d| format!("{}\n", d.display())).join("");
        fs::write(&manifest, listing)?;

        let sum_dir = path.join(SUM_DIR);
        fs::create_dir_all(&sum_dir)?;
        let program = self.bin_dir.join("xcombine_sem");
        for name in self.parameters.iter() {
            info!(parameter = name, sources = sources.len(), "summing kernels");
            self.runner.run(
                &self.scratch,
                &program,
                &[
                    format!("{}_kernel", name),
                    manifest.display().to_string(),
                    sum_dir.display().to_string(),
                ],
                Some(&self.log_path("output_combine_sem.txt")),
            )?;
        }
        Ok(())
    }

    /// Convolve kernels in `path` with a Gaussian of half-width `span` in
    /// both the horizontal and vertical directions.
    pub fn smooth(&self, path: &Path, span: f64) -> FwiResult<()> {
        require_dir(path)?;
        let program = self.bin_dir.join("xsmooth_sem");
        for name in self.parameters.iter() {
            info!(parameter = name, span, "smoothing");
            self.runner.run(
                &self.scratch_dir()?,
                &program,
                &[
                    span.to_string(),
                    span.to_string(),
                    format!("{}_kernel", name),
                    dir_arg(path),
                    dir_arg(path),
                ],
                Some(&self.log_path("output_smooth_sem.txt")),
            )?;
        }
        self.relocate_inputs(path, "_nosmooth", "_smooth")
    }

    /// Clip kernel values in `path` to `[min, max]`. Nothing happens when
    /// neither bound is finite.
    pub fn clip(&self, path: &Path, min: f64, max: f64) -> FwiResult<()> {
        require_dir(path)?;
        if min == f64::NEG_INFINITY && max == f64::INFINITY {
            return Ok(());
        }
        let min = if min.is_finite() { min } else { -(f32::MAX as f64) };
        let max = if max.is_finite() { max } else { f32::MAX as f64 };

        let program = self.bin_dir.join("xclip_sem");
        for name in self.parameters.iter() {
            info!(parameter = name, min, max, "clipping");
            self.runner.run(
                &self.scratch_dir()?,
                &program,
                &[
                    min.to_string(),
                    max.to_string(),
                    format!("{}_kernel", name),
                    dir_arg(path),
                    dir_arg(path),
                ],
                Some(&self.log_path("output_clip_sem.txt")),
            )?;
        }
        self.relocate_inputs(path, "_noclip", "_clip")
    }

    fn scratch_dir(&self) -> FwiResult<PathBuf> {
        fs::create_dir_all(&self.scratch)?;
        Ok(self.scratch.clone())
    }

    /// Move stage inputs to `{path}{archive_suffix}` and strip `tool_suffix`
    /// from the stage outputs left behind. Inputs stay put unless every one
    /// of them has a matching output.
    fn relocate_inputs(&self, path: &Path, archive_suffix: &str, tool_suffix: &str) -> FwiResult<()> {
        for name in self.parameters.iter() {
            let inputs = fs_ops::matching(path, &format!("*{}_kernel.bin", name))?.len();
            let outputs = fs_ops::matching(path, &format!("*{}_kernel{}.bin", name, tool_suffix))?.len();
            if outputs == 0 || outputs != inputs {
                return Err(FwiError::MissingOutput(format!(
                    "{} {}_kernel files in {} but {} with suffix {}",
                    inputs,
                    name,
                    path.display(),
                    outputs,
                    tool_suffix
                )));
            }
        }

        let archive = sibling(path, archive_suffix);
        fs::create_dir_all(&archive)?;
        for name in self.parameters.iter() {
            fs_ops::move_matching(path, &format!("*{}_kernel.bin", name), &archive)?;
        }
        fs_ops::rename_in_names(&fs_ops::matching(path, "*")?, tool_suffix, "")?;
        Ok(())
    }
}

fn require_dir(path: &Path) -> FwiResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(FwiError::MissingPath(path.to_path_buf()))
    }
}

/// `sum` and the `sum_nosmooth` / `sum_noclip` archives next to it
fn is_sum_dir(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SUM_DIR))
}

/// Solver utilities expect directory arguments with a trailing slash.
fn dir_arg(path: &Path) -> String {
    format!("{}/", path.display())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", name, suffix))
}
