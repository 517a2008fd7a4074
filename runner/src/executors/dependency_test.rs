use super::{
    dependency::{render_atom, Dependency, Predicate},
    BatchSystem, JobId,
};

#[test]
fn lsf_atoms() {
    assert_eq!(
        render_atom(BatchSystem::Lsf, Predicate::AllEnded, JobId(17)),
        "numended(17,*)"
    );
    assert_eq!(
        render_atom(BatchSystem::Lsf, Predicate::EndedOrRunning, JobId(17)),
        "(numended(17, > 0) || numrun(17, > 0))"
    );
}

#[test]
fn slurm_atoms() {
    assert_eq!(
        render_atom(BatchSystem::Slurm, Predicate::AllEnded, JobId(17)),
        "afterany:17"
    );
    assert_eq!(
        render_atom(BatchSystem::Slurm, Predicate::EndedOrRunning, JobId(17)),
        "after:17"
    );
}

#[test]
fn conjunction_keeps_order() {
    let dependency = Dependency::on(Predicate::AllEnded, JobId(17))
        .and(Dependency::on(Predicate::AllEnded, JobId(42)));

    assert_eq!(
        dependency.render(BatchSystem::Lsf).unwrap(),
        "numended(17,*) && numended(42,*)"
    );
    assert_eq!(
        dependency.render(BatchSystem::Slurm).unwrap(),
        "afterany:17,afterany:42"
    );
    assert_eq!(dependency.job_ids(), vec![JobId(17), JobId(42)]);
}

#[test]
fn empty_operands_are_dropped() {
    let atom = Dependency::on(Predicate::EndedOrRunning, JobId(3));

    assert_eq!(Dependency::Empty.and(atom.clone()), atom);
    assert_eq!(atom.clone().and(Dependency::Empty), atom);
    assert_eq!(Dependency::raw("  "), Dependency::Empty);
    assert!(Dependency::Empty.and(Dependency::Empty).is_empty());
}

#[test]
fn empty_dependency_has_no_flag() {
    assert_eq!(Dependency::Empty.render(BatchSystem::Lsf), None);
    assert!(Dependency::Empty.flag(BatchSystem::Slurm).is_empty());
    assert!(Dependency::all(Predicate::AllEnded, []).is_empty());
}

#[test]
fn raw_expressions_are_carried_verbatim() {
    let dependency =
        Dependency::raw("done(12)").and(Dependency::all(Predicate::AllEnded, [JobId(5), JobId(6)]));

    assert_eq!(
        dependency.flag(BatchSystem::Lsf),
        vec![
            "-w".to_string(),
            "done(12) && numended(5,*) && numended(6,*)".to_string()
        ]
    );
}

#[test]
fn slurm_uses_a_single_flag() {
    let dependency = Dependency::all(Predicate::AllEnded, [JobId(1), JobId(2), JobId(3)]);

    assert_eq!(
        dependency.flag(BatchSystem::Slurm),
        vec!["--dependency=afterany:1,afterany:2,afterany:3".to_string()]
    );
}
