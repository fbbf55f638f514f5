use crate::error::ClientError;
use crate::model::{
    Branch, NewBranch, NewProject, NewProvider, NewToken, Project, Provider, RemoteBranch,
    RemoteProject, Token,
};
use crate::paging::{Page, walk_pages};

pub type ClientResult<T> = Result<T, ClientError>;

/// Build definition file looked up at the tip of a project's default branch.
pub const BUILD_DEFINITION_FILE: &str = ".wharf-ci.yml";

/// Branch assumed when GitLab reports no default branch.
pub const DEFAULT_REF: &str = "master";

/// Read access to GitLab needed by an import.
///
/// `page` is 1-based; [`crate::paging::FIRST_PAGE`] (0) asks for the provider default.
pub trait GitLabFetcher {
    fn list_projects(&self, page: i64) -> ClientResult<Page<RemoteProject>>;

    /// Namespace-scoped search, so it may return projects outside the group.
    fn list_projects_from_group(&self, group: &str, page: i64)
    -> ClientResult<Page<RemoteProject>>;

    /// Build definition text on `default_branch`, or an empty string if the file is absent.
    fn get_build_definition_if_exists(
        &self,
        project_id: u64,
        default_branch: &str,
    ) -> ClientResult<String>;

    fn get_branches(&self, project_id: u64, page: i64) -> ClientResult<Page<RemoteBranch>>;

    fn get_project(&self, group: &str, project: &str) -> ClientResult<RemoteProject> {
        find_single_project(self, group, project)
    }
}

/// Lists the group and keeps exact name or path matches; anything but one match is an error.
pub fn find_single_project<F>(fetcher: &F, group: &str, project: &str) -> ClientResult<RemoteProject>
where
    F: GitLabFetcher + ?Sized,
{
    let mut matches = Vec::new();
    walk_pages(
        |page| fetcher.list_projects_from_group(group, page),
        |projects| {
            matches.extend(
                projects
                    .into_iter()
                    .filter(|candidate| candidate.name == project || candidate.path == project),
            );
            Ok(())
        },
    )?;
    if matches.len() != 1 {
        return Err(ClientError::ProjectMatch {
            group: group.to_string(),
            project: project.to_string(),
            count: matches.len(),
        });
    }
    Ok(matches.remove(0))
}

/// Calls against the build-orchestration backend. Each method is one endpoint.
pub trait BackendClient {
    fn get_token_by_id(&self, token_id: u64) -> ClientResult<Token>;
    fn list_tokens(&self) -> ClientResult<Vec<Token>>;
    fn create_token(&self, token: &NewToken) -> ClientResult<Token>;
    fn update_token(&self, token_id: u64, token: &NewToken) -> ClientResult<Token>;

    fn get_provider_by_id(&self, provider_id: u64) -> ClientResult<Provider>;
    fn list_providers(&self) -> ClientResult<Vec<Provider>>;
    fn create_provider(&self, provider: &NewProvider) -> ClientResult<Provider>;
    fn update_provider(&self, provider_id: u64, provider: &NewProvider)
    -> ClientResult<Provider>;

    fn get_project(&self, project_id: u64) -> ClientResult<Project>;
    /// Creates the project, or updates the one the backend already holds with
    /// the same name, group and provider.
    fn create_project(&self, project: &NewProject) -> ClientResult<Project>;
    fn update_project(&self, project_id: u64, project: &NewProject) -> ClientResult<Project>;

    fn create_project_branch(&self, project_id: u64, branch: &NewBranch) -> ClientResult<Branch>;
    fn update_project_branch_list(
        &self,
        project_id: u64,
        branches: &[NewBranch],
    ) -> ClientResult<Vec<Branch>>;
}
