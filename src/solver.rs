//! Capability interface over the solver families, plus the SPECFEM variants.
//!
//! The evaluator drives a `SolverBackend` and never looks at which family it
//! is talking to. Backends only know how to stage a model, mesh it and run
//! forward or adjoint simulations inside a prepared working directory.

use crate::config::{SolverKind, ValidatedConfig};
use crate::fs_ops;
use crate::par_file::{getpar, setpar};
use crate::tool_runner::ToolRunner;
use crate::{FwiError, FwiResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything a backend needs to act on one source's working directory.
pub struct SolverContext<'a> {
    pub workdir: &'a Path,
    pub config: &'a ValidatedConfig,
    pub runner: &'a ToolRunner,
}

impl SolverContext<'_> {
    pub fn par_file(&self) -> PathBuf {
        self.workdir.join("DATA").join("Par_file")
    }

    /// Run `bin/{exe}` with stdout to `OUTPUT_FILES/{log}`
    pub fn run_bin(&self, exe: &str, log: &str) -> FwiResult<()> {
        let program = self.workdir.join("bin").join(exe);
        let log = self.workdir.join("OUTPUT_FILES").join(log);
        self.runner.run::<&str>(self.workdir, &program, &[], Some(&log))
    }

    pub fn set_simulation_type(&self, simulation_type: u8, save_forward: bool) -> FwiResult<()> {
        let par_file = self.par_file();
        setpar(&par_file, "SIMULATION_TYPE", &simulation_type.to_string())?;
        setpar(&par_file, "SAVE_FORWARD", if save_forward { ".true." } else { ".false." })
    }

    /// Copy the `.bin` files of a model into `dst` (relative to the workdir)
    pub fn install_model(&self, model_path: &Path, dst: &str) -> FwiResult<()> {
        if !model_path.exists() {
            return Err(FwiError::MissingPath(model_path.to_path_buf()));
        }
        let copied = fs_ops::copy_matching(model_path, "*.bin", &self.workdir.join(dst))?;
        if copied == 0 {
            return Err(FwiError::MissingRequiredInput(format!(
                "no model files in {}",
                model_path.display()
            )));
        }
        Ok(())
    }

    /// The adjoint solver reads its sources from `SEM`.
    pub fn link_adjoint_traces(&self) -> FwiResult<()> {
        let sem = self.workdir.join("SEM");
        let adj = self.workdir.join("traces").join("adj");
        fs_ops::remove_if_exists(&sem)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&adj, &sem)?;
        #[cfg(not(unix))]
        fs_ops::copy_dir_all(&adj, &sem)?;
        Ok(())
    }
}

pub trait SolverBackend {
    fn name(&self) -> &'static str;

    /// Input deck file prefix; sources are `{prefix}_{name}`
    fn source_prefix(&self) -> &'static str;

    /// Directory, relative to the workdir, where synthetics are written
    fn output_dir(&self) -> &'static str {
        "OUTPUT_FILES"
    }

    /// Glob selecting synthetic traces inside `output_dir`
    fn data_wildcard(&self) -> &'static str;

    /// Directory, relative to the workdir, holding model and kernel files
    fn model_databases(&self) -> &'static str;

    /// File name prefix of model parameters, e.g. `reg1_` for the crust-mantle region
    fn model_prefix(&self) -> &'static str {
        ""
    }

    fn check_solver_parameter_files(&self, ctx: &SolverContext) -> FwiResult<()> {
        let par_file = ctx.par_file();
        if !par_file.exists() {
            warn!(path = %par_file.display(), "no Par_file to check");
            return Ok(());
        }
        if let Ok(value) = getpar(&par_file, "NPROC") {
            let nproc: usize = value
                .parse()
                .map_err(|_| FwiError::Config(format!("NPROC in Par_file is not a number: {}", value)))?;
            if nproc != ctx.config.nproc {
                return Err(FwiError::Config(format!(
                    "Par_file NPROC = {} but configured NPROC = {}",
                    nproc, ctx.config.nproc
                )));
            }
        }
        Ok(())
    }

    /// Stage `model_path` and run a forward simulation whose synthetics
    /// serve as observed data.
    fn generate_data(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()>;

    /// Stage `model_path` and build the solver databases from it.
    fn generate_mesh(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()>;

    fn forward(&self, ctx: &SolverContext) -> FwiResult<()>;

    fn adjoint(&self, ctx: &SolverContext) -> FwiResult<()>;
}

pub fn backend_for(kind: SolverKind) -> Box<dyn SolverBackend> {
    match kind {
        SolverKind::Specfem2d => Box::new(Specfem2d),
        SolverKind::Specfem3d => Box::new(Specfem3d),
        SolverKind::Specfem3dGlobe => Box::new(Specfem3dGlobe),
    }
}

/// 2-D solver: models live next to the input deck and are meshed on every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Specfem2d;

impl SolverBackend for Specfem2d {
    fn name(&self) -> &'static str {
        "specfem2d"
    }

    fn source_prefix(&self) -> &'static str {
        "SOURCE"
    }

    fn data_wildcard(&self) -> &'static str {
        "*.su"
    }

    fn model_databases(&self) -> &'static str {
        "DATA"
    }

    fn generate_data(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.install_model(model_path, self.model_databases())?;
        self.forward(ctx)
    }

    fn generate_mesh(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.install_model(model_path, self.model_databases())
    }

    fn forward(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(1, true)?;
        ctx.run_bin("xmeshfem2D", "output_mesher.txt")?;
        ctx.run_bin("xspecfem2D", "output_solver.txt")
    }

    fn adjoint(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(3, false)?;
        ctx.link_adjoint_traces()?;
        ctx.run_bin("xmeshfem2D", "output_mesher.txt")?;
        ctx.run_bin("xspecfem2D", "output_solver.txt")
    }
}

/// Regional 3-D solver: databases are regenerated from GLL model files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Specfem3d;

impl SolverBackend for Specfem3d {
    fn name(&self) -> &'static str {
        "specfem3d"
    }

    fn source_prefix(&self) -> &'static str {
        "CMTSOLUTION"
    }

    fn data_wildcard(&self) -> &'static str {
        "*.sem?"
    }

    fn model_databases(&self) -> &'static str {
        "OUTPUT_FILES/DATABASES_MPI"
    }

    fn generate_data(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        self.generate_mesh(ctx, model_path)?;
        ctx.set_simulation_type(1, true)?;
        ctx.run_bin("xspecfem3D", "output_solver.txt")
    }

    fn generate_mesh(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.run_bin("xmeshfem3D", "output_meshfem3D.txt")?;
        ctx.install_model(model_path, self.model_databases())?;
        ctx.run_bin("xgenerate_databases", "output_generate_databases.txt")
    }

    fn forward(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(1, true)?;
        ctx.run_bin("xgenerate_databases", "output_generate_databases.txt")?;
        ctx.run_bin("xspecfem3D", "output_solver.txt")
    }

    fn adjoint(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(3, false)?;
        ctx.link_adjoint_traces()?;
        ctx.run_bin("xspecfem3D", "output_solver.txt")
    }
}

/// Global solver: the mesher reads GLL models for the crust-mantle region.
#[derive(Debug, Clone, Copy, Default)]
pub struct Specfem3dGlobe;

impl SolverBackend for Specfem3dGlobe {
    fn name(&self) -> &'static str {
        "specfem3d_globe"
    }

    fn source_prefix(&self) -> &'static str {
        "CMTSOLUTION"
    }

    fn data_wildcard(&self) -> &'static str {
        "*.sem.ascii"
    }

    fn model_databases(&self) -> &'static str {
        "OUTPUT_FILES/DATABASES_MPI"
    }

    fn model_prefix(&self) -> &'static str {
        "reg1_"
    }

    fn generate_data(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        self.generate_mesh(ctx, model_path)?;
        self.forward(ctx)
    }

    fn generate_mesh(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.install_model(model_path, self.model_databases())?;
        ctx.run_bin("xmeshfem3D", "output_mesher.txt")
    }

    fn forward(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(1, true)?;
        ctx.run_bin("xspecfem3D", "output_solver.txt")
    }

    fn adjoint(&self, ctx: &SolverContext) -> FwiResult<()> {
        ctx.set_simulation_type(3, false)?;
        ctx.link_adjoint_traces()?;
        info!(solver = self.name(), "running adjoint simulation");
        ctx.run_bin("xspecfem3D", "output_solver.txt")
    }
}
