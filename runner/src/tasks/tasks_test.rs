use super::{describe, parse_indices, parse_task_string, read_indices, rerun_path, write_indices, TaskSpecError};
use std::{fs, path::Path};

#[test]
fn parse_single_list_and_range() {
    assert_eq!(parse_task_string("3").unwrap(), vec![3]);
    assert_eq!(parse_task_string("1,4,2").unwrap(), vec![1, 4, 2]);
    assert_eq!(parse_task_string("1 > 4").unwrap(), vec![1, 2, 3]);
    assert_eq!(parse_task_string("0>2").unwrap(), vec![0, 1]);
    assert!(parse_task_string("4 > 1").unwrap().is_empty());
}

#[test]
fn malformed_specs_are_rejected() {
    for spec in ["", "a", "1,b", "1 > x", "1.5"] {
        assert!(
            matches!(parse_task_string(spec), Err(TaskSpecError::MalformedTaskSpec(_))),
            "{spec} should be malformed"
        );
    }
}

#[test]
fn index_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indices__job.yaml");

    write_indices(&path, &[5, 1, 9]).unwrap();

    assert_eq!(read_indices(&path).unwrap(), vec![5, 1, 9]);
    assert_eq!(parse_indices(path.to_str().unwrap()).unwrap(), vec![5, 1, 9]);
}

#[test]
fn index_file_falls_back_to_first_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.txt");
    fs::write(&path, "2 > 5\nignored\n").unwrap();

    assert_eq!(read_indices(&path).unwrap(), vec![2, 3, 4]);
}

#[test]
fn empty_index_file_is_an_empty_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indices.yaml");

    write_indices(&path, &[]).unwrap();

    assert!(read_indices(&path).unwrap().is_empty());
}

#[test]
fn rerun_path_keeps_the_extension() {
    assert_eq!(
        rerun_path(Path::new("/tmp/indices__job.yaml")),
        Path::new("/tmp/indices__job_rerun.yaml")
    );
    assert_eq!(rerun_path(Path::new("tasks")), Path::new("tasks_rerun"));
}

#[test]
fn describe_ranges_and_lists() {
    assert_eq!(describe(&[3, 4, 5]), "3 > 6");
    assert_eq!(describe(&[10, 2, 4]), "[10, 2, 4]");
    assert_eq!(describe(&[3, 5, 5]), "[3, 5, 5]");
}

#[test]
fn describe_extreme_indices() {
    assert_eq!(
        describe(&[i64::MIN, i64::MAX]),
        format!("[{}, {}]", i64::MIN, i64::MAX)
    );
    assert_eq!(describe(&[i64::MAX]), "9223372036854775807 > 9223372036854775808");
    assert_eq!(describe(&[i64::MAX - 1, i64::MAX]), "9223372036854775806 > 9223372036854775808");
}
