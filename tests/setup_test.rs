//! Setup paths other than the synthetic-data inversion: observed data from an
//! archive, missing inputs, stale working directories, leader-only side effects
//! and kernel export without solver aliases.
#![cfg(unix)]

mod common;

use common::{prepare_inputs, registry_for, sorted_names, FakePreprocessor, FakeSolver};
use fwi::evaluator::Evaluator;
use fwi::fortran_io::write_bin;
use fwi::fs_ops::copy_dir_all;
use fwi::model_store::partition_file_name;
use fwi::sources::WorkerIdentity;
use fwi::FwiError;
use std::fs;

#[test]
fn test_setup_requires_data_or_true_model() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut raw = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]);
    raw.paths.model_true = None;
    let config = raw.check().unwrap();
    let registry = registry_for(&config);

    let result =
        Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0)).setup();
    assert!(matches!(result, Err(FwiError::MissingRequiredInput(_))));
}

#[test]
fn test_setup_copies_observed_data_from_archive() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let archive = root.join("data");
    fs::create_dir_all(archive.join("EVENT_A")).unwrap();
    fs::write(archive.join("EVENT_A").join("AA.S0001.BXZ.semd"), "observed").unwrap();
    fs::write(archive.join("EVENT_A").join("AA.S0002.BXZ.semd"), "observed").unwrap();

    let mut raw = prepare_inputs(root, 2, &["EVENT_A"]);
    raw.paths.data = Some(archive);
    let config = raw.check().unwrap();
    let registry = registry_for(&config);
    let evaluator = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0));

    evaluator.setup().unwrap();

    let obs = evaluator.workdir().unwrap().join("traces").join("obs");
    assert_eq!(sorted_names(&obs), ["AA.S0001.BXZ.semd", "AA.S0002.BXZ.semd"]);
    assert_eq!(fs::read_to_string(obs.join("AA.S0001.BXZ.semd")).unwrap(), "observed");
}

#[test]
fn test_setup_fails_on_empty_archive() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("data").join("EVENT_A")).unwrap();

    let mut raw = prepare_inputs(root, 2, &["EVENT_A"]);
    raw.paths.data = Some(root.join("data"));
    let config = raw.check().unwrap();
    let registry = registry_for(&config);

    let result =
        Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0)).setup();
    assert!(matches!(result, Err(FwiError::MissingRequiredInput(_))));
}

#[test]
fn test_only_leader_seeds_optimizer() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A", "EVENT_B"]).check().unwrap();
    let registry = registry_for(&config);
    let seed = config.optimizer_seed_path().unwrap();

    Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(1))
        .setup()
        .unwrap();
    assert!(!seed.exists());
    assert!(!config.reference_model_dir().exists());

    Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0))
        .setup()
        .unwrap();
    assert!(seed.exists());
}

#[test]
fn test_existing_seed_is_left_alone() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]).check().unwrap();
    let registry = registry_for(&config);
    let seed = config.optimizer_seed_path().unwrap();
    fs::create_dir_all(seed.parent().unwrap()).unwrap();
    fs::write(&seed, b"from an earlier run").unwrap();

    Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0))
        .setup()
        .unwrap();

    assert_eq!(fs::read(&seed).unwrap(), b"from an earlier run");
}

#[test]
fn test_worker_beyond_source_count() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]).check().unwrap();
    let registry = registry_for(&config);

    let result =
        Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(3)).setup();
    assert!(matches!(result, Err(FwiError::WorkerOutOfRange { index: 3, sources: 1 })));
}

#[test]
fn test_missing_residuals_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]).check().unwrap();
    let registry = registry_for(&config);
    let evaluator = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0));
    evaluator.setup().unwrap();

    let result = evaluator.export_residuals(&temp_dir.path().join("scratch"));
    assert!(matches!(result, Err(FwiError::MissingOutput(_))));
}

#[test]
fn test_setup_clears_previous_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]).check().unwrap();
    let registry = registry_for(&config);
    let evaluator = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0));

    let workdir = evaluator.workdir().unwrap();
    fs::create_dir_all(workdir.join("traces").join("syn")).unwrap();
    fs::write(workdir.join("stale.txt"), "left over").unwrap();
    fs::write(workdir.join("traces").join("syn").join("old.semd"), "old").unwrap();

    evaluator.setup().unwrap();

    assert!(!workdir.join("stale.txt").exists());
    assert!(sorted_names(&workdir.join("traces").join("syn")).is_empty());
}

#[test]
fn test_only_leader_writes_minmax_report() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A", "EVENT_B"]).check().unwrap();
    let registry = registry_for(&config);
    let leader = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0));
    let follower = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(1));
    leader.setup().unwrap();
    follower.setup().unwrap();

    let path = temp_dir.path().join("scratch");
    copy_dir_all(&config.reference_model_dir(), &path.join("model")).unwrap();
    let report = config.paths.log_dir.join("output.minmax");

    follower.import_model(&path).unwrap();
    assert!(!report.exists());
    assert_eq!(sorted_names(&follower.model_databases().unwrap()).len(), 2 * 3);

    leader.import_model(&path).unwrap();
    assert!(fs::read_to_string(&report).unwrap().contains("vp"));
}

#[test]
fn test_kernel_export_without_aliases() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = prepare_inputs(temp_dir.path(), 2, &["EVENT_A"]).check().unwrap();
    let registry = registry_for(&config);
    let evaluator = Evaluator::new(&config, &FakeSolver, &FakePreprocessor, &registry, WorkerIdentity::new(0));
    evaluator.setup().unwrap();

    let databases = evaluator.model_databases().unwrap();
    for iproc in 0..2 {
        write_bin(&databases.join(partition_file_name(iproc, "vp_kernel")), &[1.0, 2.0]).unwrap();
    }

    let path = temp_dir.path().join("scratch");
    evaluator.export_kernels(&path).unwrap();

    assert_eq!(
        sorted_names(&path.join("kernels").join("EVENT_A")),
        ["proc000000_vp_kernel.bin", "proc000001_vp_kernel.bin"]
    );
}
