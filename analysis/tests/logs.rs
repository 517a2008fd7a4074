use jobchain::JobId;
use jobchain_analysis::{check::unfinished_logs, log_files, send};
use std::{fs, path::Path};

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn populate(dir: &Path) {
    write(
        dir,
        "done.log",
        "Job id main (main0): 11\nAll indices finished\nJob id merge (merge0): 12\nFinished running merge\n",
    );
    write(dir, "running.log", "Job id main (main0): 21\nJob id merge (merge0): 22\n");
    write(dir, ".hidden.log", "Job id main (main0): 31\n");
    write(dir, "running_main0.o", "Job id main (main0): 41\n");
    fs::create_dir(dir.join("nested")).unwrap();
    write(&dir.join("nested"), "deep.log", "Job id main (main0): 51\n");
}

#[test]
fn only_visible_logs_at_the_top_level() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());

    let files = log_files(dir.path(), None).unwrap();

    assert_eq!(names(&files), vec!["done.log", "running.log"]);
}

#[test]
fn check_reports_unfinished_chains() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());

    let unfinished = unfinished_logs(dir.path()).unwrap();

    assert_eq!(names(&unfinished), vec!["running.log"]);
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    assert!(log_files(&dir.path().join("absent"), None).is_err());
}

#[test]
fn send_runs_the_command_for_each_filtered_job() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let received = dir.path().join("received");

    let ids = send::collect_job_ids(dir.path(), Some("running")).unwrap();
    assert_eq!(ids, vec![JobId(21), JobId(22)]);

    let command = format!("sh -c 'echo $0 >> {}'", received.display());
    let statuses = send::send_to_jobs(&command, &ids).unwrap();

    assert!(statuses.iter().all(|status| status.success()));
    assert_eq!(fs::read_to_string(&received).unwrap(), "21\n22\n");
}
