use crate::error::ImportError;
use serde::{Deserialize, Serialize};

/// Body of an import call. Zero ids and empty strings mean "not set".
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportRequest {
    pub token_id: u64,
    pub token: String,
    pub user: String,
    pub url: String,
    pub provider_id: u64,
    pub project_id: u64,
    pub project: String,
    pub group: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImportIntent {
    Refresh { project_id: u64 },
    Project { group: String, project: String },
    Group { group: String },
    All,
}

impl ImportRequest {
    /// Resolves which import the request asks for.
    ///
    /// A known backend project id always means a refresh. A project name
    /// without a group is rejected.
    pub fn intent(&self) -> Result<ImportIntent, ImportError> {
        if self.project_id != 0 {
            return Ok(ImportIntent::Refresh {
                project_id: self.project_id,
            });
        }
        match (self.group.is_empty(), self.project.is_empty()) {
            (false, false) => Ok(ImportIntent::Project {
                group: self.group.clone(),
                project: self.project.clone(),
            }),
            (false, true) => Ok(ImportIntent::Group {
                group: self.group.clone(),
            }),
            (true, true) => Ok(ImportIntent::All),
            (true, false) => Err(ImportError::InvalidRequest(format!(
                "specify either group, group and project, or neither; project without group is invalid (group={:?}, project={:?})",
                self.group, self.project
            ))),
        }
    }
}
