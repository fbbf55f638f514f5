use crate::paging::StalledPaging;
use crate::report::ImportReport;
use thiserror::Error;

/// Failure of a single GitLab or backend call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unauthorized: {message}")]
    Unauthorized { realm: String, message: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("expected exactly one project matching {group}/{project}, found {count}")]
    ProjectMatch {
        group: String,
        project: String,
        count: usize,
    },
    #[error(transparent)]
    StalledPaging(#[from] StalledPaging),
    #[error("{0:#}")]
    Request(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    pub fn realm(&self) -> Option<&str> {
        match self {
            ClientError::Unauthorized { realm, .. } => Some(realm.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import request: {0}")]
    InvalidRequest(String),
    #[error("gitlab: {0}")]
    GitLab(#[source] ClientError),
    #[error("backend: {0}")]
    Backend(#[source] ClientError),
    #[error("{0}")]
    Partial(ImportReport),
}

/// Every paged listing walked by the importer comes from GitLab.
impl From<StalledPaging> for ImportError {
    fn from(stalled: StalledPaging) -> Self {
        ImportError::GitLab(ClientError::StalledPaging(stalled))
    }
}

impl ImportError {
    pub fn is_unauthorized(&self) -> bool {
        self.realm().is_some()
    }

    /// Challenge to send back in `WWW-Authenticate` when credentials were rejected.
    pub fn realm(&self) -> Option<&str> {
        match self {
            ImportError::GitLab(err) | ImportError::Backend(err) => err.realm(),
            _ => None,
        }
    }
}
