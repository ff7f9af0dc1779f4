//! Per-worker evaluation of the misfit, its gradient and Hessian-vector
//! products.
//!
//! Each worker owns one source and one working directory. Workers never talk
//! to each other: they meet only in the shared results area (`residuals/`,
//! `kernels/`, `traces/` under the evaluation path) and in the read-only
//! reference model. The single piece of one-time shared state, the
//! optimizer's starting vector, is written by the leader and guarded by an
//! existence check.

use crate::config::ValidatedConfig;
use crate::fs_ops;
use crate::model_store::ModelStore;
use crate::preprocess::Preprocessor;
use crate::solver::{SolverBackend, SolverContext};
use crate::sources::{SourceRegistry, WorkerIdentity};
use crate::tool_runner::ToolRunner;
use crate::vector::{merge, save_vector};
use crate::{FwiError, FwiResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Solver-internal kernel names and the parameter names they stand for
const KERNEL_ALIASES: [(&str, &str); 2] = [("alpha", "vp"), ("beta", "vs")];

const ADJOINT_CHANNELS: [char; 3] = ['x', 'y', 'z'];

pub struct Evaluator<'a> {
    config: &'a ValidatedConfig,
    backend: &'a dyn SolverBackend,
    preprocessor: &'a dyn Preprocessor,
    registry: &'a SourceRegistry,
    runner: ToolRunner,
    store: ModelStore,
    worker: WorkerIdentity,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        config: &'a ValidatedConfig,
        backend: &'a dyn SolverBackend,
        preprocessor: &'a dyn Preprocessor,
        registry: &'a SourceRegistry,
        worker: WorkerIdentity,
    ) -> Self {
        Self {
            config,
            backend,
            preprocessor,
            registry,
            runner: ToolRunner::from_config(config),
            store: ModelStore::from_config(config),
            worker,
        }
    }

    pub fn worker(&self) -> WorkerIdentity {
        self.worker
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Name of the source assigned to this worker
    pub fn source_name(&self) -> FwiResult<&str> {
        self.registry.current_source(self.worker)
    }

    /// Working directory of this worker's source
    pub fn workdir(&self) -> FwiResult<PathBuf> {
        Ok(self.registry.working_directory(self.source_name()?))
    }

    pub fn model_databases(&self) -> FwiResult<PathBuf> {
        Ok(self.workdir()?.join(self.backend.model_databases()))
    }

    fn with_context<T>(&self, f: impl FnOnce(&SolverContext) -> FwiResult<T>) -> FwiResult<T> {
        let workdir = self.workdir()?;
        let ctx = SolverContext { workdir: &workdir, config: self.config, runner: &self.runner };
        f(&ctx)
    }

    // setup

    /// Prepare this worker's source for an inversion: working directory,
    /// observed data, initial model, adjoint trace placeholders and, on the
    /// leader, the optimizer's starting vector.
    pub fn setup(&self) -> FwiResult<()> {
        let source = self.source_name()?;
        let workdir = self.workdir()?;
        info!(worker = self.worker.index, source, solver = self.backend.name(), "setting up");

        fs_ops::remove_if_exists(&workdir)?;

        let paths = &self.config.paths;
        match (&paths.data, &paths.model_true) {
            (Some(data), _) => {
                self.initialize_solver_directories()?;
                let copied = fs_ops::copy_matching(&data.join(source), "*", &workdir.join("traces").join("obs"))?;
                if copied == 0 {
                    return Err(FwiError::MissingRequiredInput(format!(
                        "no observed data for {} in {}",
                        source,
                        data.display()
                    )));
                }
            }
            (None, Some(model_true)) => {
                self.initialize_solver_directories()?;
                self.with_context(|ctx| self.backend.generate_data(ctx, model_true))?;
                self.collect_synthetics("traces/obs")?;
            }
            (None, None) => {
                return Err(FwiError::MissingRequiredInput(
                    "either a data archive or a true model must be configured".into(),
                ));
            }
        }

        let model_init = paths.model_init.as_ref().ok_or_else(|| {
            FwiError::MissingRequiredInput("an initial model must be configured".into())
        })?;
        self.with_context(|ctx| self.backend.generate_mesh(ctx, model_init))?;
        self.export_model(&self.config.reference_model_dir())?;

        self.initialize_adjoint_traces()?;
        self.initialize_io_machinery()
    }

    /// Lay out the directory tree the solver expects and stage executables
    /// and the input deck for this source.
    pub fn initialize_solver_directories(&self) -> FwiResult<()> {
        let workdir = self.workdir()?;
        for dir in ["bin", "DATA", "OUTPUT_FILES", "traces/obs", "traces/syn", "traces/adj"] {
            fs::create_dir_all(workdir.join(dir))?;
        }
        fs::create_dir_all(self.model_databases()?)?;

        let paths = &self.config.paths;
        fs_ops::copy_matching(&paths.specfem_bin, "*", &workdir.join("bin"))?;
        fs_ops::copy_matching(&paths.specfem_data, "*", &workdir.join("DATA"))?;

        let prefix = self.backend.source_prefix();
        let data_dir = workdir.join("DATA");
        let source_file = data_dir.join(format!("{}_{}", prefix, self.source_name()?));
        if !source_file.exists() {
            return Err(FwiError::MissingRequiredInput(format!(
                "source file {} missing from input deck",
                source_file.display()
            )));
        }
        fs::copy(&source_file, data_dir.join(prefix))?;

        self.with_context(|ctx| self.backend.check_solver_parameter_files(ctx))
    }

    /// Zero adjoint sources for every component; those in use are
    /// overwritten during evaluation.
    pub fn initialize_adjoint_traces(&self) -> FwiResult<()> {
        let traces = self.workdir()?.join("traces");
        for channel in ADJOINT_CHANNELS {
            self.preprocessor
                .write_zero_traces(&traces.join("obs"), &traces.join("adj"), channel)?;
        }
        Ok(())
    }

    /// Seed the optimizer with the initial model, once per inversion.
    pub fn initialize_io_machinery(&self) -> FwiResult<()> {
        if !self.worker.is_leader() || !self.config.optimize {
            return Ok(());
        }
        let seed = self.config.optimizer_seed_path().ok_or_else(|| {
            FwiError::MissingRequiredInput("optimization enabled without an optimize path".into())
        })?;
        let model_init = self
            .config
            .paths
            .model_init
            .as_ref()
            .filter(|p| p.exists())
            .ok_or_else(|| FwiError::MissingRequiredInput("initial model does not exist".into()))?;

        if seed.exists() {
            debug!(path = %seed.display(), "optimizer seed already present");
            return Ok(());
        }
        let model = self.store.load(model_init, self.backend.model_prefix(), "", false)?;
        save_vector(&seed, &merge(&model)?)?;
        info!(path = %seed.display(), "seeded optimizer from initial model");
        Ok(())
    }

    // evaluation

    /// Forward simulation and misfit for the model under `{path}/model`.
    pub fn eval_func(&self, path: &Path, export_traces: bool) -> FwiResult<()> {
        info!(worker = self.worker.index, path = %path.display(), "evaluating misfit");
        self.import_model(path)?;

        self.with_context(|ctx| self.backend.forward(ctx))?;
        self.collect_synthetics("traces/syn")?;
        self.preprocessor.prepare_eval_grad(&self.workdir()?)?;

        self.export_residuals(path)?;
        if export_traces {
            self.export_traces(path, "traces/syn")?;
        }
        Ok(())
    }

    /// Adjoint simulation; adjoint sources must already be in `traces/adj`.
    pub fn eval_grad(&self, path: &Path, export_traces: bool) -> FwiResult<()> {
        info!(worker = self.worker.index, path = %path.display(), "evaluating gradient");
        self.with_context(|ctx| self.backend.adjoint(ctx))?;

        self.export_kernels(path)?;
        if export_traces {
            self.export_traces(path, "traces/adj")?;
        }
        Ok(())
    }

    /// Action of the Hessian on the model under `{path}/model`. Synthetics go
    /// to `traces/lcg` so the misfit synthetics stay intact.
    pub fn apply_hess(&self, path: &Path) -> FwiResult<()> {
        info!(worker = self.worker.index, path = %path.display(), "applying Hessian");
        fs::create_dir_all(self.workdir()?.join("traces").join("lcg"))?;

        self.import_model(path)?;
        self.with_context(|ctx| self.backend.forward(ctx))?;
        self.collect_synthetics("traces/lcg")?;
        self.preprocessor.prepare_apply_hess(&self.workdir()?)?;

        self.with_context(|ctx| self.backend.adjoint(ctx))?;
        self.export_kernels(path)
    }

    /// Move freshly written synthetics into `dst` (relative to the workdir).
    fn collect_synthetics(&self, dst: &str) -> FwiResult<usize> {
        let workdir = self.workdir()?;
        let moved = fs_ops::move_matching(
            &workdir.join(self.backend.output_dir()),
            self.backend.data_wildcard(),
            &workdir.join(dst),
        )?;
        if moved == 0 {
            return Err(FwiError::MissingOutput(format!(
                "solver wrote no traces matching {}/{}",
                self.backend.output_dir(),
                self.backend.data_wildcard()
            )));
        }
        debug!(count = moved, dst, "collected synthetics");
        Ok(moved)
    }

    // transfer

    pub fn import_model(&self, path: &Path) -> FwiResult<()> {
        let src = path.join("model");
        let dst = self.model_databases()?;
        let prefix = self.backend.model_prefix();
        let model = self.store.load(&src, prefix, "", self.worker.is_leader())?;
        self.store.save(&dst, &model, prefix, "")
    }

    pub fn import_traces(&self, path: &Path) -> FwiResult<()> {
        let src = path.join("traces").join(self.source_name()?);
        fs_ops::copy_matching(&src, "*", &self.workdir()?.join("traces").join("obs"))?;
        Ok(())
    }

    /// Leader copies the current model databases to `path`.
    pub fn export_model(&self, path: &Path) -> FwiResult<()> {
        if !self.worker.is_leader() {
            return Ok(());
        }
        fs_ops::copy_matching(&self.model_databases()?, "*.bin", path)?;
        Ok(())
    }

    pub fn export_kernels(&self, path: &Path) -> FwiResult<()> {
        let databases = self.model_databases()?;

        for (alias, name) in KERNEL_ALIASES {
            let aliased = fs_ops::matching(&databases, &format!("*{}*_kernel.bin", alias))?;
            if !aliased.is_empty() {
                fs_ops::rename_in_names(&aliased, alias, name)?;
            }
        }

        let dst = path.join("kernels").join(self.source_name()?);
        let moved = fs_ops::move_matching(&databases, "*kernel.bin", &dst)?;
        if moved == 0 {
            return Err(FwiError::MissingOutput(format!(
                "adjoint run left no kernels in {}",
                databases.display()
            )));
        }
        debug!(count = moved, dst = %dst.display(), "exported kernels");
        Ok(())
    }

    pub fn export_residuals(&self, path: &Path) -> FwiResult<()> {
        let src = self.workdir()?.join("residuals");
        if !src.exists() {
            return Err(FwiError::MissingOutput(format!("no residuals at {}", src.display())));
        }
        let dst_root = path.join("residuals");
        fs::create_dir_all(&dst_root)?;
        fs_ops::move_path(&src, &dst_root.join(self.source_name()?))
    }

    pub fn export_traces(&self, path: &Path, prefix: &str) -> FwiResult<()> {
        let src = self.workdir()?.join(prefix);
        let dst = path.join("traces").join(self.source_name()?);
        fs_ops::copy_dir_all(&src, &dst)
    }
}
