use crate::config::ValidatedConfig;
use crate::fortran_io::{read_bin, write_bin};
use crate::parameters::{ParameterSet, SOLVER_FIELDS};
use crate::{FwiError, FwiResult};
use rustc_hash::FxHashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MINMAX_LOG: &str = "output.minmax";

/// `proc000003_vp_kernel.bin` for processor 3 and name `vp_kernel`
pub fn partition_file_name(iproc: usize, name: &str) -> String {
    format!("proc{:06}_{}.bin", iproc, name)
}

/// A model or kernel held as one array per (parameter, processor).
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedModel {
    parameters: ParameterSet,
    arrays: FxHashMap<String, Vec<Vec<f32>>>,
}

impl PartitionedModel {
    pub fn new(parameters: ParameterSet) -> Self {
        let arrays = parameters.iter().map(|p| (p.to_string(), Vec::new())).collect();
        Self { parameters, arrays }
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Append the next processor's array for `name`.
    pub fn push(&mut self, name: &str, values: Vec<f32>) -> FwiResult<()> {
        match self.arrays.get_mut(name) {
            Some(procs) => {
                procs.push(values);
                Ok(())
            }
            None => Err(FwiError::Other(format!(
                "parameter {} is not part of {}",
                name, self.parameters
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Vec<f32>]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    pub fn array(&self, name: &str, iproc: usize) -> FwiResult<&[f32]> {
        self.get(name)
            .and_then(|procs| procs.get(iproc))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                FwiError::Other(format!("model has no {} array for processor {}", name, iproc))
            })
    }

    /// Number of processor arrays held for the first parameter.
    pub fn nproc(&self) -> usize {
        self.parameters
            .iter()
            .next()
            .and_then(|p| self.arrays.get(p))
            .map_or(0, Vec::len)
    }
}

/// Running per-parameter extrema across processors. Diagnostic only.
#[derive(Debug, Clone)]
pub struct MinMax {
    parameters: ParameterSet,
    bounds: FxHashMap<String, (f32, f32)>,
}

impl MinMax {
    pub fn new(parameters: ParameterSet) -> Self {
        let bounds = parameters
            .iter()
            .map(|p| (p.to_string(), (f32::INFINITY, f32::NEG_INFINITY)))
            .collect();
        Self { parameters, bounds }
    }

    pub fn update(&mut self, name: &str, values: &[f32]) {
        if let Some((lo, hi)) = self.bounds.get_mut(name) {
            for &v in values {
                *lo = lo.min(v);
                *hi = hi.max(v);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<(f32, f32)> {
        self.bounds.get(name).copied()
    }

    /// Append a report block for `model_path` to `{log_dir}/output.minmax`
    pub fn write_report(&self, model_path: &Path, log_dir: &Path) -> FwiResult<()> {
        fs::create_dir_all(log_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(MINMAX_LOG))?;

        writeln!(file, "{}", model_path.display())?;
        for name in self.parameters.iter() {
            if let Some((lo, hi)) = self.get(name) {
                writeln!(file, "{:<5} {:12.4e} {:12.4e}", name, lo, hi)?;
                info!(parameter = name, min = lo, max = hi, "model range");
            }
        }
        writeln!(file)?;
        Ok(())
    }
}

/// Reads and writes partitioned models in the layout the solver expects.
#[derive(Debug, Clone)]
pub struct ModelStore {
    nproc: usize,
    parameters: ParameterSet,
    reference_dir: PathBuf,
    log_dir: PathBuf,
}

impl ModelStore {
    pub fn new(
        nproc: usize,
        parameters: ParameterSet,
        reference_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            nproc,
            parameters,
            reference_dir: reference_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(
            config.nproc,
            config.parameters.clone(),
            config.reference_model_dir(),
            config.paths.log_dir.clone(),
        )
    }

    pub fn nproc(&self) -> usize {
        self.nproc
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn load(
        &self,
        path: &Path,
        prefix: &str,
        suffix: &str,
        track_stats: bool,
    ) -> FwiResult<PartitionedModel> {
        let mut model = PartitionedModel::new(self.parameters.clone());
        let mut minmax = MinMax::new(self.parameters.clone());

        for iproc in 0..self.nproc {
            for name in self.parameters.iter() {
                let file = path.join(partition_file_name(iproc, &format!("{}{}{}", prefix, name, suffix)));
                let values = read_bin(&file)?;
                minmax.update(name, &values);
                model.push(name, values)?;
            }
        }

        debug!(path = %path.display(), nproc = self.nproc, "loaded model");
        if track_stats {
            minmax.write_report(path, &self.log_dir)?;
        }
        Ok(model)
    }

    /// Write every active parameter and copy the solver-required fields that
    /// are not being inverted for from the reference model.
    pub fn save(
        &self,
        path: &Path,
        model: &PartitionedModel,
        prefix: &str,
        suffix: &str,
    ) -> FwiResult<()> {
        fs::create_dir_all(path)?;

        for iproc in 0..self.nproc {
            for name in self.parameters.iter() {
                let file = path.join(partition_file_name(iproc, &format!("{}{}{}", prefix, name, suffix)));
                write_bin(&file, model.array(name, iproc)?)?;
            }
            for name in SOLVER_FIELDS.iter().filter(|f| !self.parameters.contains(f)) {
                copy_partition(
                    &self.reference_dir,
                    path,
                    iproc,
                    &format!("{}{}{}", prefix, name, suffix),
                )?;
            }
        }

        debug!(path = %path.display(), nproc = self.nproc, "saved model");
        Ok(())
    }
}

/// Copy one partition file unchanged from `src_dir` to `dst_dir`.
pub fn copy_partition(src_dir: &Path, dst_dir: &Path, iproc: usize, name: &str) -> FwiResult<()> {
    let file_name = partition_file_name(iproc, name);
    let src = src_dir.join(&file_name);
    if !src.exists() {
        return Err(FwiError::MissingPartitionFile(src));
    }
    fs::copy(&src, dst_dir.join(&file_name))?;
    Ok(())
}
