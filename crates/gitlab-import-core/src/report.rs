use crate::model::{RemoteBranch, RemoteProject};
use std::fmt;

/// Remote record an import failure is attributed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Record {
    Project {
        id: u64,
        name: String,
    },
    Branch {
        project_id: u64,
        project: String,
        name: String,
    },
}

impl Record {
    pub fn project(project: &RemoteProject) -> Self {
        Record::Project {
            id: project.id,
            name: project.name.clone(),
        }
    }

    pub fn branch(project: &RemoteProject, branch: &RemoteBranch) -> Self {
        Record::Branch {
            project_id: project.id,
            project: project.name.clone(),
            name: branch.name.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Project { id, name } => write!(f, "project {id} ({name})"),
            Record::Branch {
                project_id,
                project,
                name,
            } => write!(f, "branch {name} of project {project_id} ({project})"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordFailure {
    pub record: Record,
    pub error: String,
}

/// Outcome of one import operation: what was written and, in order, what was not.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportReport {
    pub projects: usize,
    pub branches: usize,
    pub failures: Vec<RecordFailure>,
}

impl ImportReport {
    pub fn record_failure(&mut self, record: Record, error: impl fmt::Display) {
        self.failures.push(RecordFailure {
            record,
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turns a report with failures into the aggregate import error.
    pub fn into_result(self) -> Result<ImportReport, crate::error::ImportError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(crate::error::ImportError::Partial(self))
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record(s) failed to import ({} project(s) and {} branch(es) imported)",
            self.failures.len(),
            self.projects,
            self.branches
        )?;
        for failure in &self.failures {
            write!(f, "\n{}: {}", failure.record, failure.error)?;
        }
        Ok(())
    }
}
