#![allow(dead_code)]

use fwi::config::{InversionConfig, ValidatedConfig};
use fwi::fortran_io::write_bin;
use fwi::model_store::partition_file_name;
use fwi::preprocess::Preprocessor;
use fwi::solver::{SolverBackend, SolverContext};
use fwi::sources::SourceRegistry;
use fwi::FwiResult;
use std::fs;
use std::path::Path;

pub const NPTS: usize = 5;

/// Solver stand-in: writes one synthetic trace per forward run and one
/// `alpha`/`beta` kernel per processor per adjoint run, using the solver's
/// internal kernel names.
pub struct FakeSolver;

impl SolverBackend for FakeSolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn source_prefix(&self) -> &'static str {
        "SOURCE"
    }

    fn data_wildcard(&self) -> &'static str {
        "*.semd"
    }

    fn model_databases(&self) -> &'static str {
        "DATABASES_MPI"
    }

    fn generate_data(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.install_model(model_path, self.model_databases())?;
        self.forward(ctx)
    }

    fn generate_mesh(&self, ctx: &SolverContext, model_path: &Path) -> FwiResult<()> {
        ctx.install_model(model_path, self.model_databases())
    }

    fn forward(&self, ctx: &SolverContext) -> FwiResult<()> {
        let out = ctx.workdir.join("OUTPUT_FILES");
        fs::create_dir_all(&out)?;
        fs::write(out.join("AA.S0001.BXZ.semd"), "synthetic")?;
        fs::write(out.join("output_solver.txt"), "log")?;
        Ok(())
    }

    fn adjoint(&self, ctx: &SolverContext) -> FwiResult<()> {
        let db = ctx.workdir.join(self.model_databases());
        for iproc in 0..ctx.config.nproc {
            write_bin(&db.join(partition_file_name(iproc, "alpha_kernel")), &[1.0; NPTS])?;
            write_bin(&db.join(partition_file_name(iproc, "beta_kernel")), &[2.0; NPTS])?;
        }
        Ok(())
    }
}

/// Preprocessing stand-in that leaves marker files where the real one
/// would leave residuals and adjoint sources.
pub struct FakePreprocessor;

impl Preprocessor for FakePreprocessor {
    fn prepare_eval_grad(&self, workdir: &Path) -> FwiResult<()> {
        let residuals = workdir.join("residuals");
        fs::create_dir_all(&residuals)?;
        fs::write(residuals.join("AA.S0001.BXZ"), "0.5")?;
        fs::write(workdir.join("traces").join("adj").join("AA.S0001.BXZ.adj"), "adjoint")?;
        Ok(())
    }

    fn prepare_apply_hess(&self, workdir: &Path) -> FwiResult<()> {
        let lcg = workdir.join("traces").join("lcg");
        assert!(lcg.join("AA.S0001.BXZ.semd").exists(), "Hessian synthetics should be in traces/lcg");
        fs::write(workdir.join("traces").join("adj").join("AA.S0001.BXZ.adj"), "hessian")?;
        Ok(())
    }

    fn write_zero_traces(&self, _obs_dir: &Path, adj_dir: &Path, channel: char) -> FwiResult<()> {
        fs::write(adj_dir.join(format!("zeros_{}", channel)), "0")?;
        Ok(())
    }
}

pub fn write_model(dir: &Path, nproc: usize, base: f32) {
    fs::create_dir_all(dir).unwrap();
    for iproc in 0..nproc {
        for (k, name) in ["vp", "vs", "rho"].iter().enumerate() {
            let values: Vec<f32> = (0..NPTS).map(|i| base + (k * 1000 + iproc * 10 + i) as f32).collect();
            write_bin(&dir.join(partition_file_name(iproc, name)), &values).unwrap();
        }
    }
}

/// Lay out an input deck, executables and true/initial models for
/// `sources` under `root` and return a configuration pointing at them.
pub fn prepare_inputs(root: &Path, nproc: usize, sources: &[&str]) -> InversionConfig {
    let bin = root.join("specfem_bin");
    let data = root.join("specfem_data");
    fs::create_dir_all(&bin).unwrap();
    fs::create_dir_all(&data).unwrap();
    fs::write(bin.join("xspecfem3D"), "exit 0\n").unwrap();
    fs::write(data.join("STATIONS"), "S0001 AA 0 0 0 0\n").unwrap();
    for source in sources {
        fs::write(data.join(format!("SOURCE_{}", source)), format!("source {}\n", source)).unwrap();
    }

    write_model(&root.join("model_true"), nproc, 100.0);
    write_model(&root.join("model_init"), nproc, 0.0);

    let mut raw = InversionConfig::custom(nproc, root.join("global"), &bin, &data);
    raw.paths.model_true = Some(root.join("model_true"));
    raw.paths.model_init = Some(root.join("model_init"));
    raw.paths.optimize = Some(root.join("global").join("optimize"));
    raw.parameters.optimize = true;
    raw.parameters.mpi_exec = vec!["sh".to_string()];
    raw
}

pub fn registry_for(config: &ValidatedConfig) -> SourceRegistry {
    SourceRegistry::for_prefix(&config.paths.specfem_data, FakeSolver.source_prefix(), &config.paths.solver)
}

pub fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
