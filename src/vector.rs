//! Conversion between partitioned models and the flat vectors used by the
//! optimizer.
//!
//! Layout: for each parameter in set order, for each processor in rank
//! order, that processor's values. Reconstruction depends on every processor
//! array having the same length, so both directions check it.

use crate::model_store::PartitionedModel;
use crate::parameters::ParameterSet;
use crate::{FwiError, FwiResult};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn merge(model: &PartitionedModel) -> FwiResult<Vec<f32>> {
    let npts = uniform_length(model)?;
    let nproc = model.nproc();
    let mut v = Vec::with_capacity(npts * nproc * model.parameters().len());
    for name in model.parameters().iter() {
        for iproc in 0..nproc {
            v.extend_from_slice(model.array(name, iproc)?);
        }
    }
    Ok(v)
}

pub fn split(v: &[f32], parameters: &ParameterSet, nproc: usize) -> FwiResult<PartitionedModel> {
    let nparams = parameters.len();
    let chunks = nproc * nparams;
    if chunks == 0 || v.len() % chunks != 0 {
        return Err(FwiError::VectorLength { len: v.len(), nproc, nparams });
    }
    let npts = v.len() / chunks;

    let mut model = PartitionedModel::new(parameters.clone());
    let mut arrays = v.chunks_exact(npts.max(1));
    for name in parameters.iter() {
        for _ in 0..nproc {
            let values = if npts == 0 {
                Vec::new()
            } else {
                arrays.next().map(<[f32]>::to_vec).unwrap_or_default()
            };
            model.push(name, values)?;
        }
    }
    Ok(model)
}

/// Length shared by every processor array, or the first offender.
fn uniform_length(model: &PartitionedModel) -> FwiResult<usize> {
    let nproc = model.nproc();
    let mut expected = None;
    for name in model.parameters().iter() {
        let procs = model.get(name).unwrap_or_default();
        if procs.len() != nproc {
            return Err(FwiError::NonUniformPartitions {
                parameter: name.to_string(),
                iproc: procs.len(),
                expected: nproc,
                found: procs.len(),
            });
        }
        for (iproc, values) in procs.iter().enumerate() {
            match expected {
                None => expected = Some(values.len()),
                Some(n) if n != values.len() => {
                    return Err(FwiError::NonUniformPartitions {
                        parameter: name.to_string(),
                        iproc,
                        expected: n,
                        found: values.len(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(expected.unwrap_or(0))
}

/// Persist a vector for the optimizer. Written to a uniquely named
/// temporary sibling and renamed into place, so concurrent writers (on this
/// host or another sharing the filesystem) never leave a torn file.
pub fn save_vector(path: &Path, v: &[f32]) -> FwiResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let bytes = bincode::encode_to_vec(v, bincode::config::standard())?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "vector".to_string());

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(&bytes)?;
    temp.persist(path).map_err(|e| FwiError::Io(e.error))?;
    Ok(())
}

pub fn load_vector(path: &Path) -> FwiResult<Vec<f32>> {
    let bytes = fs::read(path)?;
    let (v, _): (Vec<f32>, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_model(params: &ParameterSet, nproc: usize, npts: usize) -> PartitionedModel {
        let mut model = PartitionedModel::new(params.clone());
        for (k, name) in params.iter().enumerate() {
            for iproc in 0..nproc {
                let values = (0..npts).map(|i| (k * 1000 + iproc * 100 + i) as f32).collect();
                model.push(name, values).unwrap();
            }
        }
        model
    }

    #[test]
    fn test_merge_order() {
        let params = ParameterSet::from_names(["vp", "vs"]);
        let model = uniform_model(&params, 2, 2);
        let v = merge(&model).unwrap();
        assert_eq!(v, vec![0.0, 1.0, 100.0, 101.0, 1000.0, 1001.0, 1100.0, 1101.0]);
    }

    #[test]
    fn test_split_inverts_merge() {
        let params = ParameterSet::from_names(["vp", "vs", "rho"]);
        let model = uniform_model(&params, 4, 7);
        let v = merge(&model).unwrap();
        assert_eq!(v.len(), 3 * 4 * 7);
        assert_eq!(split(&v, &params, 4).unwrap(), model);
    }

    #[test]
    fn test_split_rejects_uneven_length() {
        let params = ParameterSet::from_names(["vp", "vs"]);
        let v = vec![0.0f32; 13];
        match split(&v, &params, 4) {
            Err(FwiError::VectorLength { len, nproc, nparams }) => {
                assert_eq!((len, nproc, nparams), (13, 4, 2));
            }
            other => panic!("expected length error, got {:?}", other),
        }
    }

    #[test]
    fn test_split_rejects_zero_partitions() {
        let params = ParameterSet::from_names(["vp"]);
        assert!(split(&[1.0], &params, 0).is_err());
    }

    #[test]
    fn test_split_empty_vector() {
        let params = ParameterSet::from_names(["vp"]);
        let model = split(&[], &params, 2).unwrap();
        assert_eq!(model.nproc(), 2);
        assert!(model.array("vp", 1).unwrap().is_empty());
    }

    #[test]
    fn test_merge_rejects_non_uniform() {
        let params = ParameterSet::from_names(["vp"]);
        let mut model = PartitionedModel::new(params);
        model.push("vp", vec![1.0, 2.0, 3.0]).unwrap();
        model.push("vp", vec![4.0, 5.0]).unwrap();

        match merge(&model) {
            Err(FwiError::NonUniformPartitions { iproc, expected, found, .. }) => {
                assert_eq!((iproc, expected, found), (1, 3, 2));
            }
            other => panic!("expected non-uniform error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_rejects_missing_processor() {
        let params = ParameterSet::from_names(["vp", "vs"]);
        let mut model = PartitionedModel::new(params);
        model.push("vp", vec![1.0]).unwrap();
        model.push("vp", vec![2.0]).unwrap();
        model.push("vs", vec![3.0]).unwrap();
        assert!(merge(&model).is_err());
    }

    #[test]
    fn test_vector_file_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("optimize").join("m_new");
        let v = vec![1.0f32, -2.5, 3.25];

        save_vector(&path, &v).unwrap();
        assert_eq!(load_vector(&path).unwrap(), v);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_concurrent_saves_leave_one_whole_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("m_new");

        let handles: Vec<_> = (0..8)
            .map(|k| {
                let path = path.clone();
                std::thread::spawn(move || save_vector(&path, &vec![k as f32; 1000]))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let v = load_vector(&path).unwrap();
        assert_eq!(v.len(), 1000);
        assert!(v.iter().all(|x| *x == v[0]));
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
