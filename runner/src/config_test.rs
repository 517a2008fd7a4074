use crate::{
    config::{
        parse_key_value, parse_n_cores, ResourceBucket, ResourceOverrides, Resources, Workspace,
    },
    scheduler::plan::Function,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[test]
fn defaults_match_cluster_defaults() {
    let bucket = ResourceBucket::default();

    assert_eq!(bucket.memory, 1000.0);
    assert_eq!(bucket.time, 4.0);
    assert_eq!(bucket.scratch, 2000.0);
    assert_eq!(bucket.nproc, 1);
    assert_eq!(bucket.ngpu, 0);
}

#[test]
fn later_layers_win() {
    let from_executable: ResourceOverrides =
        serde_yaml::from_str("main_memory: 4000\nmain_time: 10\nmerge_nproc: 4\n").unwrap();
    let from_cli = ResourceOverrides {
        main_memory: Some(8000.0),
        ..Default::default()
    };

    let mut resources = Resources::default();
    resources.apply(&from_executable);
    resources.apply(&from_cli);

    assert_eq!(resources.main.memory, 8000.0);
    assert_eq!(resources.main.time, 10.0);
    assert_eq!(resources.merge.nproc, 4);
    assert_eq!(resources.preprocess, ResourceBucket::default());
}

#[test]
fn unknown_resource_keys_are_collected() {
    let overrides: ResourceOverrides =
        serde_yaml::from_str("main_memory: 10\nqueue: long\n").unwrap();

    assert_eq!(overrides.main_memory, Some(10.0));
    assert!(overrides.other.contains_key("queue"));
}

#[test]
fn time_per_index_is_resolved_against_cores() {
    let mut resources = Resources::default();
    resources.apply(&ResourceOverrides {
        main_time_per_index: Some(0.5),
        ..Default::default()
    });

    resources.resolve_time_per_index(10, 3);

    // ceil(10 / 3) = 4 indices on the busiest core
    assert_eq!(resources.main.time, 2.0);
    assert_eq!(resources.main_time_per_index, None);
}

#[test]
fn explicit_time_replaces_earlier_time_per_index() {
    let mut resources = Resources::default();
    resources.apply(&ResourceOverrides {
        main_time_per_index: Some(0.5),
        ..Default::default()
    });
    resources.apply(&ResourceOverrides {
        main_time: Some(1.0),
        ..Default::default()
    });

    resources.resolve_time_per_index(100, 1);

    assert_eq!(resources.main.time, 1.0);
}

#[test]
fn buckets_per_function() {
    let mut resources = Resources::default();
    resources.main.memory = 1.0;
    resources.preprocess.memory = 2.0;
    resources.merge.memory = 3.0;
    resources.merge.nproc = 8;

    assert_eq!(resources.bucket_for(&Function::Main).memory, 1.0);
    assert_eq!(resources.bucket_for(&Function::RerunMissing).memory, 1.0);
    assert_eq!(resources.bucket_for(&Function::Preprocess).memory, 2.0);
    assert_eq!(resources.bucket_for(&Function::Merge).nproc, 8);
    assert_eq!(
        resources.bucket_for(&Function::Custom("plot".into())).memory,
        1.0
    );

    let missing = resources.bucket_for(&Function::Missing);
    assert_eq!(missing.memory, 3.0);
    assert_eq!(missing.nproc, 1);
}

#[test]
fn key_value_arguments() {
    assert_eq!(
        parse_key_value("q=long").unwrap(),
        ("q".to_string(), "long".to_string())
    );
    assert_eq!(
        parse_key_value("constraint=a=b").unwrap(),
        ("constraint".to_string(), "a=b".to_string())
    );
    assert!(parse_key_value("novalue").is_err());
    assert!(parse_key_value("=x").is_err());
}

#[test]
fn core_counts_are_positive() {
    assert_eq!(parse_n_cores("4").unwrap(), 4);
    assert_eq!(parse_n_cores(" 1 ").unwrap(), 1);
    assert!(parse_n_cores("0").is_err());
    assert!(parse_n_cores("-2").is_err());
    assert!(parse_n_cores("many").is_err());
}

#[test]
fn workspace_paths() {
    let workspace = Workspace::new("/work".into(), Path::new("logs"));

    assert_eq!(workspace.job_log("job"), Path::new("/work/logs/job.log"));
    assert_eq!(workspace.ledger("job"), Path::new("/work/logs/job_done.dat"));
    assert_eq!(
        workspace.indices_file("job"),
        Path::new("/work/jobchain_indices/indices__job.yaml")
    );
    assert_eq!(
        workspace.unit_logs("job", "main0"),
        (
            PathBuf::from("/work/logs/job_main0.o"),
            PathBuf::from("/work/logs/job_main0.e")
        )
    );
}

#[test]
fn clearing_unit_logs_keeps_other_units() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path().to_path_buf(), Path::new("logs"));
    workspace.create().unwrap();

    for name in [
        "job_main0.o",
        "job_main0.e",
        "job_main0.o_3",
        "job_main0.e_12",
        "job_main01.o",
        "job_main0.o_x",
        "job.log",
    ] {
        fs::write(workspace.log_dir.join(name), "").unwrap();
    }

    workspace.clear_unit_logs("job", "main0").unwrap();

    let mut left = fs::read_dir(&workspace.log_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    left.sort();

    assert_eq!(left, ["job.log", "job_main0.o_x", "job_main01.o"]);
}
