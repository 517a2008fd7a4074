use super::{joblog::JobLog, ledger::Ledger};
use crate::executable::ExecutableError;
use std::{fs, sync::Arc, thread, time::Duration};

type Check = fn(&[i64]) -> Result<Vec<i64>, ExecutableError>;

#[test]
fn duplicates_are_counted_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("job_done.dat"));

    ledger.record_done(3).unwrap();
    ledger.record_done(3).unwrap();
    ledger.record_done(1).unwrap();

    assert_eq!(fs::read_to_string(ledger.path()).unwrap(), "3\n3\n1\n");
    assert_eq!(ledger.recorded().unwrap().into_iter().collect::<Vec<_>>(), vec![1, 3]);

    let missing = ledger.missing_indices(&[0, 1, 2], None::<Check>).unwrap();
    assert_eq!(missing, vec![0, 2]);
}

#[test]
fn corruption_check_is_merged_into_missing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("job_done.dat"));

    for index in [0, 1, 2, 3] {
        ledger.record_done(index).unwrap();
    }

    let missing = ledger
        .missing_indices(&[4, 3, 2, 1, 0], Some(|_: &[i64]| Ok(vec![2, 4, 2])))
        .unwrap();

    assert_eq!(missing, vec![2, 4]);
}

#[test]
fn missing_waits_for_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("late_done.dat"))
        .with_poll_interval(Duration::from_millis(10));

    let writer = ledger.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        writer.record_done(1).unwrap();
    });

    let missing = ledger.missing_indices(&[0, 1], None::<Check>).unwrap();
    handle.join().unwrap();

    assert_eq!(missing, vec![0]);
}

#[test]
fn absent_ledger_is_empty_without_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("never_done.dat"));

    assert!(ledger.recorded().unwrap().is_empty());
    assert_eq!(
        ledger.missing_indices_now(&[5, 4], None::<Check>).unwrap(),
        vec![4, 5]
    );
}

#[test]
fn malformed_lines_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("job_done.dat"));
    fs::write(ledger.path(), "1\nnot a number\n").unwrap();

    assert!(ledger.recorded().is_err());
}

#[test]
fn concurrent_writers_do_not_lose_records() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::new(dir.path().join("job_done.dat")));

    let handles = (0..8)
        .map(|worker| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for index in (worker * 50)..((worker + 1) * 50) {
                    ledger.record_done(index).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.join().unwrap();
    }

    let recorded = ledger.recorded().unwrap();
    assert_eq!(recorded.len(), 400);
    assert_eq!(fs::read_to_string(ledger.path()).unwrap().lines().count(), 400);
}

#[test]
fn job_log_lines_are_timestamped() {
    let dir = tempfile::tempdir().unwrap();
    let log = JobLog::new(dir.path().join("job.log"));

    log.write("Running main").unwrap();
    log.write("Finished running main").unwrap();

    let content = fs::read_to_string(log.path()).unwrap();
    let lines = content.lines().collect::<Vec<_>>();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("Running main"));
    assert!(lines[1].ends_with("Finished running main"));
}
