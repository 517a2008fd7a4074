use super::{Cli, Commands};
use clap::{error::ErrorKind, Parser};

#[test]
fn submit_defaults_to_a_single_core() {
    let cli = Cli::try_parse_from(["jobchain", "submit", "--executable=./exe"]).unwrap();

    match cli.command {
        Commands::Submit(args) => assert_eq!(args.n_cores, 1),
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn zero_cores_are_rejected() {
    let submit = Cli::try_parse_from(["jobchain", "submit", "--executable=./exe", "--n-cores=0"]);
    let worker = Cli::try_parse_from([
        "jobchain",
        "worker",
        "--job-name=job",
        "--executable=./exe",
        "--tasks=0 > 4",
        "--n-cores",
        "0",
    ]);

    assert_eq!(submit.unwrap_err().kind(), ErrorKind::ValueValidation);
    assert_eq!(worker.unwrap_err().kind(), ErrorKind::ValueValidation);
}

#[test]
fn worker_accepts_its_array_size() {
    let cli = Cli::try_parse_from([
        "jobchain",
        "worker",
        "--job-name=job",
        "--executable=./exe",
        "--tasks=0 > 4",
        "--n-cores=3",
    ])
    .unwrap();

    match cli.command {
        Commands::Worker(command) => assert_eq!(command.n_cores, 3),
        other => panic!("unexpected command {other:?}"),
    }
}
