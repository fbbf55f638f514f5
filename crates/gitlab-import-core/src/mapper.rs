use crate::model::{NewBranch, NewProject, RemoteBranch, RemoteProject};

/// Translates GitLab records into backend request bodies for one token/provider pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mapper {
    token_id: u64,
    provider_id: u64,
}

impl Mapper {
    pub fn new(token_id: u64, provider_id: u64) -> Self {
        Self {
            token_id,
            provider_id,
        }
    }

    pub fn token_id(&self) -> u64 {
        self.token_id
    }

    pub fn provider_id(&self) -> u64 {
        self.provider_id
    }

    pub fn map_project(&self, project: &RemoteProject, build_definition: String) -> NewProject {
        NewProject {
            name: project.name.clone(),
            group_name: project.group_path().to_string(),
            description: project.description.clone().unwrap_or_default(),
            avatar_url: project.avatar_url.clone().unwrap_or_default(),
            token_id: self.token_id,
            provider_id: self.provider_id,
            build_definition,
            git_url: project.ssh_url_to_repo.clone(),
            remote_project_id: project.id.to_string(),
        }
    }

    pub fn map_branch(&self, branch: &RemoteBranch) -> NewBranch {
        NewBranch {
            name: branch.name.clone(),
            default: branch.default,
        }
    }

    pub fn map_branches(&self, branches: &[RemoteBranch]) -> Vec<NewBranch> {
        branches.iter().map(|branch| self.map_branch(branch)).collect()
    }
}
