use crate::parameters::{DensityPolicy, Material, ParameterSet};
use crate::{FwiError, FwiResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "FWI_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Specfem2d,
    #[default]
    Specfem3d,
    Specfem3dGlobe,
}

/// Scalar inversion settings as read from the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverParameters {
    pub nproc: Option<usize>,
    #[serde(default)]
    pub material: Material,
    #[serde(default)]
    pub density: DensityPolicy,
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(default)]
    pub optimize: bool,
    /// Launcher argv prepended to every external tool, e.g. `["mpiexec", "-n", "4"]`
    #[serde(default)]
    pub mpi_exec: Vec<String>,
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
    #[serde(default)]
    pub preprocess_exec: Option<PathBuf>,
}

/// Directory settings as read from the configuration file. Everything is
/// optional here; `InversionConfig::check` decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverPaths {
    pub global: Option<PathBuf>,
    pub local: Option<PathBuf>,
    pub solver: Option<PathBuf>,
    pub specfem_bin: Option<PathBuf>,
    pub specfem_data: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub model_true: Option<PathBuf>,
    pub model_init: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub optimize: Option<PathBuf>,
    pub submit: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InversionConfig {
    #[serde(default)]
    pub parameters: SolverParameters,
    #[serde(default)]
    pub paths: SolverPaths,
}

impl InversionConfig {
    /// Minimal configuration for tests and programmatic use
    pub fn custom(
        nproc: usize,
        global: impl Into<PathBuf>,
        specfem_bin: impl Into<PathBuf>,
        specfem_data: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parameters: SolverParameters { nproc: Some(nproc), ..Default::default() },
            paths: SolverPaths {
                global: Some(global.into()),
                specfem_bin: Some(specfem_bin.into()),
                specfem_data: Some(specfem_data.into()),
                ..Default::default()
            },
        }
    }

    pub fn from_file(path: &Path) -> FwiResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            FwiError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from the file named by `FWI_CONFIG`
    pub fn from_env() -> FwiResult<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map_err(|_| FwiError::MissingParameter(CONFIG_ENV_VAR.to_string()))?;
        Self::from_file(Path::new(&path))
    }

    /// Validate eagerly and resolve derived paths.
    pub fn check(self) -> FwiResult<ValidatedConfig> {
        let params = self.parameters;
        let paths = self.paths;

        let nproc = params.nproc.ok_or_else(|| FwiError::MissingParameter("NPROC".into()))?;
        if nproc == 0 {
            return Err(FwiError::Config("NPROC must be at least 1".into()));
        }

        let global = paths.global.ok_or_else(|| FwiError::MissingParameter("GLOBAL".into()))?;
        let solver = match (paths.solver, &paths.local) {
            (Some(solver), _) => solver,
            (None, Some(local)) => local.join("solver"),
            (None, None) => global.join("solver"),
        };
        let specfem_bin = paths
            .specfem_bin
            .ok_or_else(|| FwiError::MissingParameter("SPECFEM_BIN".into()))?;
        let specfem_data = paths
            .specfem_data
            .ok_or_else(|| FwiError::MissingParameter("SPECFEM_DATA".into()))?;
        let output = paths.output.unwrap_or_else(|| global.join("output"));
        let log_dir = paths.submit.unwrap_or_else(|| global.clone());

        if params.optimize && paths.optimize.is_none() {
            return Err(FwiError::MissingParameter("OPTIMIZE path".into()));
        }
        if params.tool_timeout_secs == Some(0) {
            return Err(FwiError::Config("tool_timeout_secs must be positive".into()));
        }

        Ok(ValidatedConfig {
            nproc,
            parameters: ParameterSet::from_policy(params.material, params.density),
            solver: params.solver,
            optimize: params.optimize,
            mpi_exec: params.mpi_exec,
            tool_timeout: params.tool_timeout_secs.map(Duration::from_secs),
            preprocess_exec: params.preprocess_exec,
            paths: ResolvedPaths {
                global,
                solver,
                specfem_bin,
                specfem_data,
                data: paths.data,
                model_true: paths.model_true,
                model_init: paths.model_init,
                output,
                optimize: paths.optimize,
                log_dir,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub global: PathBuf,
    pub solver: PathBuf,
    pub specfem_bin: PathBuf,
    pub specfem_data: PathBuf,
    pub data: Option<PathBuf>,
    pub model_true: Option<PathBuf>,
    pub model_init: Option<PathBuf>,
    pub output: PathBuf,
    pub optimize: Option<PathBuf>,
    pub log_dir: PathBuf,
}

/// Configuration after `check`: constructed once at startup and passed by
/// reference into every component.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub nproc: usize,
    pub parameters: ParameterSet,
    pub solver: SolverKind,
    pub optimize: bool,
    pub mpi_exec: Vec<String>,
    pub tool_timeout: Option<Duration>,
    pub preprocess_exec: Option<PathBuf>,
    pub paths: ResolvedPaths,
}

impl ValidatedConfig {
    /// Initial model as exported after meshing; source of fields that are
    /// required by the solver but not inverted for.
    pub fn reference_model_dir(&self) -> PathBuf {
        self.paths.output.join("model_init")
    }

    pub fn optimizer_seed_path(&self) -> Option<PathBuf> {
        self.paths.optimize.as_ref().map(|p| p.join("m_new"))
    }
}
