use super::{array::run_worker_with, array::WorkerArgs, run_function, TaskEnv};
use crate::{
    executable::{Executables, NativeExecutable, Stage},
    executors::BatchSystem,
    scheduler::plan::Function,
    sync::{JobLog, Ledger},
    tasks::{read_indices, write_indices},
};
use parking_lot::Mutex;
use std::{fs, path::Path, sync::Arc};

fn env<'a>(dir: &Path, executable: &'a Executables) -> TaskEnv<'a> {
    TaskEnv {
        executable,
        args: &[],
        ledger: Ledger::new(dir.join("job_done.dat")),
        job_log: Some(JobLog::new(dir.join("job.log"))),
        rerun_file: dir.join("indices__job_rerun.yaml"),
        wait_for_ledger: false,
    }
}

fn recording_main(seen: Arc<Mutex<Vec<i64>>>) -> NativeExecutable {
    NativeExecutable::new().per_index(Stage::Main, move |index, _| {
        seen.lock().push(index);
        Ok(())
    })
}

#[test]
fn main_records_every_index() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let executable: Executables = recording_main(seen.clone()).into();
    let env = env(dir.path(), &executable);

    let finished = run_function(&env, &Function::Main, vec![4, 2, 9]).unwrap();

    assert_eq!(finished, vec![4, 2, 9]);
    assert_eq!(*seen.lock(), vec![4, 2, 9]);
    assert_eq!(
        env.ledger.recorded().unwrap().into_iter().collect::<Vec<_>>(),
        vec![2, 4, 9]
    );

    let log = fs::read_to_string(dir.path().join("job.log")).unwrap();
    let lines = log.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("Running main"));
    assert!(lines[1].ends_with("Finished running main"));
}

#[test]
fn missing_falls_back_to_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let executable: Executables = NativeExecutable::new()
        .per_index(Stage::Main, |_, _| Ok(()))
        .eager(Stage::CheckMissing, |_, _| Ok(vec![1]))
        .into();
    let env = env(dir.path(), &executable);
    for index in [0, 1, 3] {
        env.ledger.record_done(index).unwrap();
    }

    let missing = run_function(&env, &Function::Missing, vec![0, 1, 2, 3, 4]).unwrap();

    assert_eq!(missing, vec![1, 2, 4]);
    assert_eq!(read_indices(&env.rerun_file).unwrap(), vec![1, 2, 4]);
    let log = fs::read_to_string(dir.path().join("job.log")).unwrap();
    assert!(!log.contains("All indices finished"));
}

#[test]
fn missing_stage_of_the_executable_wins() {
    let dir = tempfile::tempdir().unwrap();
    let executable: Executables = NativeExecutable::new()
        .eager(Stage::Missing, |indices, _| Ok(indices[..1].to_vec()))
        .into();
    let env = env(dir.path(), &executable);

    let missing = run_function(&env, &Function::Missing, vec![5, 6]).unwrap();

    assert_eq!(missing, vec![5]);
    assert_eq!(read_indices(&env.rerun_file).unwrap(), vec![5]);
}

#[test]
fn nothing_missing_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let executable: Executables = NativeExecutable::new()
        .per_index(Stage::Main, |_, _| Ok(()))
        .into();
    let env = env(dir.path(), &executable);
    run_function(&env, &Function::Main, vec![0, 1]).unwrap();

    let missing = run_function(&env, &Function::Missing, vec![0, 1]).unwrap();

    assert!(missing.is_empty());
    assert!(read_indices(&env.rerun_file).unwrap().is_empty());
    let log = fs::read_to_string(dir.path().join("job.log")).unwrap();
    assert!(log.contains("All indices finished"));
}

#[test]
fn rerun_missing_only_runs_what_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let executable: Executables = recording_main(seen.clone()).into();
    let env = env(dir.path(), &executable);
    env.ledger.record_done(1).unwrap();

    let finished = run_function(&env, &Function::RerunMissing, vec![0, 1, 2]).unwrap();

    assert_eq!(finished, vec![0, 2]);
    assert_eq!(*seen.lock(), vec![0, 2]);
}

#[test]
fn other_functions_are_drained() {
    let dir = tempfile::tempdir().unwrap();
    let executable: Executables = NativeExecutable::new()
        .eager(Stage::Custom("plot".into()), |indices, args| {
            assert_eq!(args, ["--fast".to_string()]);
            Ok(indices.iter().map(|index| index * 10).collect())
        })
        .into();
    let args = ["--fast".to_string()];
    let mut env = env(dir.path(), &executable);
    env.args = &args;

    let result = run_function(&env, &Function::Custom("plot".into()), vec![1, 2]).unwrap();

    assert_eq!(result, vec![10, 20]);
    assert!(env.ledger.recorded().unwrap().is_empty());
}

#[test]
fn worker_runs_its_partition() {
    let dir = tempfile::tempdir().unwrap();
    let indices = dir.path().join("indices__job.yaml");
    write_indices(&indices, &[0, 1, 2, 3, 4]).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let executable: Executables = recording_main(seen.clone()).into();
    let args = WorkerArgs {
        job_name: "job".to_string(),
        function: Function::Main,
        executable: "unused".into(),
        tasks: indices.to_string_lossy().into_owned(),
        n_cores: 2,
        system: BatchSystem::Slurm,
        log_dir: dir.path().to_path_buf(),
        function_args: Vec::new(),
    };

    assert_eq!(run_worker_with(&args, &executable, 0).unwrap(), vec![0, 1]);
    assert_eq!(run_worker_with(&args, &executable, 1).unwrap(), vec![2, 3, 4]);

    let ledger = Ledger::new(dir.path().join("job_done.dat"));
    assert_eq!(ledger.recorded().unwrap().len(), 5);
}
