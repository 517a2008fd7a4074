use super::{BatchSystem, JobId};

/// Start condition of a job relative to one of its predecessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Every task of the predecessor has ended, successfully or not
    AllEnded,
    /// At least one task of the predecessor has ended or is running
    EndedOrRunning,
}

/// Dependency expression of a job, rendered for a specific batch system only when the
/// submission command is built
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dependency {
    #[default]
    Empty,
    AllEnded(JobId),
    EndedOrRunning(JobId),
    /// Expression given verbatim by the user, already in the syntax of the target system
    Raw(String),
    And(Box<Dependency>, Box<Dependency>),
}

/// Render a single predicate on a job
pub fn render_atom(system: BatchSystem, predicate: Predicate, id: JobId) -> String {
    match (system, predicate) {
        (BatchSystem::Lsf, Predicate::AllEnded) => format!("numended({id},*)"),
        (BatchSystem::Lsf, Predicate::EndedOrRunning) => {
            format!("(numended({id}, > 0) || numrun({id}, > 0))")
        }
        (BatchSystem::Slurm, Predicate::AllEnded) => format!("afterany:{id}"),
        (BatchSystem::Slurm, Predicate::EndedOrRunning) => format!("after:{id}"),
    }
}

impl Dependency {
    pub fn on(predicate: Predicate, id: JobId) -> Self {
        match predicate {
            Predicate::AllEnded => Self::AllEnded(id),
            Predicate::EndedOrRunning => Self::EndedOrRunning(id),
        }
    }

    pub fn raw(expression: &str) -> Self {
        let expression = expression.trim();

        if expression.is_empty() {
            Self::Empty
        } else {
            Self::Raw(expression.to_string())
        }
    }

    /// Conjunction of all given jobs with the same predicate
    pub fn all(predicate: Predicate, ids: impl IntoIterator<Item = JobId>) -> Self {
        ids.into_iter()
            .fold(Self::Empty, |dependency, id| dependency.and(Self::on(predicate, id)))
    }

    /// Conjunction, empty operands are dropped
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, other) => other,
            (this, Self::Empty) => this,
            (this, other) => Self::And(Box::new(this), Box::new(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// All jobs referenced by the expression, in order
    pub fn job_ids(&self) -> Vec<JobId> {
        self.atoms()
            .into_iter()
            .filter_map(|atom| match atom {
                Self::AllEnded(id) | Self::EndedOrRunning(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn atoms(&self) -> Vec<&Self> {
        match self {
            Self::Empty => Vec::new(),
            Self::And(lhs, rhs) => {
                let mut atoms = lhs.atoms();
                atoms.extend(rhs.atoms());
                atoms
            }
            atom => vec![atom],
        }
    }

    /// Expression in the syntax of `system`, `None` if there is nothing to wait for.
    ///
    /// LSF joins atoms with ` && `, Slurm with `,` which it treats as a conjunction.
    pub fn render(&self, system: BatchSystem) -> Option<String> {
        let atoms = self
            .atoms()
            .into_iter()
            .filter_map(|atom| match atom {
                Self::AllEnded(id) => Some(render_atom(system, Predicate::AllEnded, *id)),
                Self::EndedOrRunning(id) => {
                    Some(render_atom(system, Predicate::EndedOrRunning, *id))
                }
                Self::Raw(expression) => Some(expression.clone()),
                Self::Empty | Self::And(..) => None,
            })
            .collect::<Vec<_>>();

        if atoms.is_empty() {
            return None;
        }

        Some(match system {
            BatchSystem::Lsf => atoms.join(" && "),
            BatchSystem::Slurm => atoms.join(","),
        })
    }

    /// Command line arguments carrying the dependency
    pub fn flag(&self, system: BatchSystem) -> Vec<String> {
        match (self.render(system), system) {
            (None, _) => Vec::new(),
            (Some(expression), BatchSystem::Lsf) => vec!["-w".to_string(), expression],
            (Some(expression), BatchSystem::Slurm) => vec![format!("--dependency={expression}")],
        }
    }
}
