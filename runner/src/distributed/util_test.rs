use super::{util::parse_rank, RunError};

#[test]
fn lsf_ranks_are_one_based() {
    assert_eq!(parse_rank("LSB_JOBINDEX", "1", true).unwrap(), 0);
    assert_eq!(parse_rank("LSB_JOBINDEX", " 12\n", true).unwrap(), 11);
}

#[test]
fn slurm_ranks_are_zero_based() {
    assert_eq!(parse_rank("SLURM_ARRAY_TASK_ID", "0", false).unwrap(), 0);
    assert_eq!(parse_rank("SLURM_ARRAY_TASK_ID", "7", false).unwrap(), 7);
}

#[test]
fn invalid_ranks() {
    assert!(matches!(
        parse_rank("LSB_JOBINDEX", "0", true),
        Err(RunError::MalformedRank { .. })
    ));
    assert!(matches!(
        parse_rank("SLURM_ARRAY_TASK_ID", "-1", false),
        Err(RunError::MalformedRank { .. })
    ));
    assert!(matches!(
        parse_rank("SLURM_ARRAY_TASK_ID", "", false),
        Err(RunError::MalformedRank { .. })
    ));
}
