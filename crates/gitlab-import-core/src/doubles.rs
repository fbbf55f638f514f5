//! In-memory stand-ins for GitLab and the backend that record every call.

use crate::error::ClientError;
use crate::model::{
    Branch, NewBranch, NewProject, NewProvider, NewToken, Project, Provider, RemoteBranch,
    RemoteProject, Token,
};
use crate::paging::{Page, PagingCursor};
use crate::provider::{BackendClient, ClientResult, GitLabFetcher, find_single_project};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GitLabCall {
    ListProjects { page: i64 },
    ListProjectsFromGroup { group: String, page: i64 },
    GetProject { group: String, project: String },
    GetBuildDefinition { project_id: u64, branch: String },
    GetBranches { project_id: u64, page: i64 },
}

impl GitLabCall {
    pub fn name(&self) -> &'static str {
        match self {
            GitLabCall::ListProjects { .. } => "list_projects",
            GitLabCall::ListProjectsFromGroup { .. } => "list_projects_from_group",
            GitLabCall::GetProject { .. } => "get_project",
            GitLabCall::GetBuildDefinition { .. } => "get_build_definition_if_exists",
            GitLabCall::GetBranches { .. } => "get_branches",
        }
    }
}

/// GitLab double serving a fixed project set, paged by `page_size` when set.
#[derive(Default)]
pub struct StubGitLab {
    projects: Vec<RemoteProject>,
    default_branches: Vec<RemoteBranch>,
    branches: HashMap<u64, Vec<RemoteBranch>>,
    build_definitions: HashMap<u64, String>,
    failing_build_definitions: HashSet<u64>,
    failing_branch_listings: HashSet<u64>,
    failing_listing: bool,
    page_size: Option<usize>,
    calls: RefCell<Vec<GitLabCall>>,
}

impl StubGitLab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(mut self, projects: Vec<RemoteProject>) -> Self {
        self.projects = projects;
        self
    }

    /// Branches served for every project without its own list.
    pub fn with_default_branches(mut self, branches: Vec<RemoteBranch>) -> Self {
        self.default_branches = branches;
        self
    }

    pub fn with_branches(mut self, project_id: u64, branches: Vec<RemoteBranch>) -> Self {
        self.branches.insert(project_id, branches);
        self
    }

    pub fn with_build_definition(mut self, project_id: u64, content: &str) -> Self {
        self.build_definitions.insert(project_id, content.to_string());
        self
    }

    pub fn failing_build_definition(mut self, project_id: u64) -> Self {
        self.failing_build_definitions.insert(project_id);
        self
    }

    pub fn failing_branch_listing(mut self, project_id: u64) -> Self {
        self.failing_branch_listings.insert(project_id);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn calls(&self) -> Vec<GitLabCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    fn record(&self, call: GitLabCall) {
        self.calls.borrow_mut().push(call);
    }

    fn paged<T: Clone>(&self, items: &[T], page: i64) -> Page<T> {
        let Some(page_size) = self.page_size else {
            return Page::new(items.to_vec(), PagingCursor::single_page(items.len() as i64));
        };
        let chunks: Vec<&[T]> = items.chunks(page_size).collect();
        let total_pages = chunks.len().max(1) as i64;
        let current_page = page.max(1);
        let items = chunks
            .get((current_page - 1) as usize)
            .map(|chunk| chunk.to_vec())
            .unwrap_or_default();
        let next_page = if current_page < total_pages {
            current_page + 1
        } else {
            0
        };
        Page::new(
            items,
            PagingCursor {
                total_items: chunks.iter().map(|chunk| chunk.len()).sum::<usize>() as i64,
                total_pages,
                items_per_page: page_size as i64,
                current_page,
                next_page,
                previous_page: current_page - 1,
            },
        )
    }
}

impl GitLabFetcher for StubGitLab {
    fn list_projects(&self, page: i64) -> ClientResult<Page<RemoteProject>> {
        self.record(GitLabCall::ListProjects { page });
        if self.failing_listing {
            return Err(anyhow::anyhow!("list projects page {page} failed").into());
        }
        Ok(self.paged(&self.projects, page))
    }

    fn list_projects_from_group(
        &self,
        group: &str,
        page: i64,
    ) -> ClientResult<Page<RemoteProject>> {
        self.record(GitLabCall::ListProjectsFromGroup {
            group: group.to_string(),
            page,
        });
        if self.failing_listing {
            return Err(anyhow::anyhow!("list projects of {group} page {page} failed").into());
        }
        let in_group: Vec<RemoteProject> = self
            .projects
            .iter()
            .filter(|project| project.group_path().eq_ignore_ascii_case(group))
            .cloned()
            .collect();
        Ok(self.paged(&in_group, page))
    }

    fn get_build_definition_if_exists(
        &self,
        project_id: u64,
        default_branch: &str,
    ) -> ClientResult<String> {
        self.record(GitLabCall::GetBuildDefinition {
            project_id,
            branch: default_branch.to_string(),
        });
        if self.failing_build_definitions.contains(&project_id) {
            return Err(anyhow::anyhow!("build definition of {project_id}: 500").into());
        }
        Ok(self
            .build_definitions
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_branches(&self, project_id: u64, page: i64) -> ClientResult<Page<RemoteBranch>> {
        self.record(GitLabCall::GetBranches { project_id, page });
        if self.failing_branch_listings.contains(&project_id) {
            return Err(anyhow::anyhow!("list branches of {project_id} failed").into());
        }
        let branches = self
            .branches
            .get(&project_id)
            .unwrap_or(&self.default_branches);
        Ok(self.paged(branches, page))
    }

    fn get_project(&self, group: &str, project: &str) -> ClientResult<RemoteProject> {
        self.record(GitLabCall::GetProject {
            group: group.to_string(),
            project: project.to_string(),
        });
        find_single_project(self, group, project)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackendCall {
    GetTokenById(u64),
    ListTokens,
    CreateToken(NewToken),
    UpdateToken(u64, NewToken),
    GetProviderById(u64),
    ListProviders,
    CreateProvider(NewProvider),
    UpdateProvider(u64, NewProvider),
    GetProject(u64),
    CreateProject(NewProject),
    UpdateProject(u64, NewProject),
    CreateProjectBranch(u64, NewBranch),
    UpdateProjectBranchList(u64, Vec<NewBranch>),
}

impl BackendCall {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCall::GetTokenById(_) => "get_token_by_id",
            BackendCall::ListTokens => "list_tokens",
            BackendCall::CreateToken(_) => "create_token",
            BackendCall::UpdateToken(..) => "update_token",
            BackendCall::GetProviderById(_) => "get_provider_by_id",
            BackendCall::ListProviders => "list_providers",
            BackendCall::CreateProvider(_) => "create_provider",
            BackendCall::UpdateProvider(..) => "update_provider",
            BackendCall::GetProject(_) => "get_project",
            BackendCall::CreateProject(_) => "create_project",
            BackendCall::UpdateProject(..) => "update_project",
            BackendCall::CreateProjectBranch(..) => "create_project_branch",
            BackendCall::UpdateProjectBranchList(..) => "update_project_branch_list",
        }
    }
}

#[derive(Default)]
struct BackendState {
    tokens: Vec<Token>,
    providers: Vec<Provider>,
    projects: Vec<Project>,
    branches: Vec<Branch>,
    last_id: u64,
}

impl BackendState {
    fn allocate_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn reserve_id(&mut self, id: u64) {
        self.last_id = self.last_id.max(id);
    }
}

/// Backend double keeping entities in memory and recording each call.
#[derive(Default)]
pub struct RecordingBackend {
    state: RefCell<BackendState>,
    calls: RefCell<Vec<BackendCall>>,
    rejected_realm: Option<String>,
    failing_projects: HashSet<String>,
    failing_branches: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: Token) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.reserve_id(token.token_id);
            state.tokens.push(token);
        }
        self
    }

    pub fn with_provider(self, provider: Provider) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.reserve_id(provider.provider_id);
            state.providers.push(provider);
        }
        self
    }

    pub fn with_project(self, project: Project) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.reserve_id(project.project_id);
            state.projects.push(project);
        }
        self
    }

    /// Every call fails as unauthorized with the given challenge.
    pub fn rejecting(mut self, realm: &str) -> Self {
        self.rejected_realm = Some(realm.to_string());
        self
    }

    pub fn failing_project(mut self, name: &str) -> Self {
        self.failing_projects.insert(name.to_string());
        self
    }

    pub fn failing_branch(mut self, name: &str) -> Self {
        self.failing_branches.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    pub fn created_projects(&self) -> Vec<NewProject> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BackendCall::CreateProject(project) => Some(project.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.state.borrow().projects.clone()
    }

    pub fn branches_of(&self, project_id: u64) -> Vec<Branch> {
        self.state
            .borrow()
            .branches
            .iter()
            .filter(|branch| branch.project_id == project_id)
            .cloned()
            .collect()
    }

    fn record(&self, call: BackendCall) -> ClientResult<()> {
        self.calls.borrow_mut().push(call);
        match &self.rejected_realm {
            Some(realm) => Err(ClientError::Unauthorized {
                realm: realm.clone(),
                message: "credentials rejected".to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn apply_project(stored: &mut Project, project: &NewProject) {
    stored.name = project.name.clone();
    stored.group_name = project.group_name.clone();
    stored.description = project.description.clone();
    stored.avatar_url = project.avatar_url.clone();
    stored.token_id = project.token_id;
    stored.provider_id = project.provider_id;
    stored.build_definition = project.build_definition.clone();
    stored.git_url = project.git_url.clone();
    stored.remote_project_id = project.remote_project_id.clone();
}

impl BackendClient for RecordingBackend {
    fn get_token_by_id(&self, token_id: u64) -> ClientResult<Token> {
        self.record(BackendCall::GetTokenById(token_id))?;
        self.state
            .borrow()
            .tokens
            .iter()
            .find(|token| token.token_id == token_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("token {token_id}")))
    }

    fn list_tokens(&self) -> ClientResult<Vec<Token>> {
        self.record(BackendCall::ListTokens)?;
        Ok(self.state.borrow().tokens.clone())
    }

    fn create_token(&self, token: &NewToken) -> ClientResult<Token> {
        self.record(BackendCall::CreateToken(token.clone()))?;
        let mut state = self.state.borrow_mut();
        let created = Token {
            token_id: state.allocate_id(),
            token: token.token.clone(),
            user_name: token.user_name.clone(),
        };
        state.tokens.push(created.clone());
        Ok(created)
    }

    fn update_token(&self, token_id: u64, token: &NewToken) -> ClientResult<Token> {
        self.record(BackendCall::UpdateToken(token_id, token.clone()))?;
        let mut state = self.state.borrow_mut();
        let stored = state
            .tokens
            .iter_mut()
            .find(|stored| stored.token_id == token_id)
            .ok_or_else(|| ClientError::NotFound(format!("token {token_id}")))?;
        stored.token = token.token.clone();
        stored.user_name = token.user_name.clone();
        Ok(stored.clone())
    }

    fn get_provider_by_id(&self, provider_id: u64) -> ClientResult<Provider> {
        self.record(BackendCall::GetProviderById(provider_id))?;
        self.state
            .borrow()
            .providers
            .iter()
            .find(|provider| provider.provider_id == provider_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("provider {provider_id}")))
    }

    fn list_providers(&self) -> ClientResult<Vec<Provider>> {
        self.record(BackendCall::ListProviders)?;
        Ok(self.state.borrow().providers.clone())
    }

    fn create_provider(&self, provider: &NewProvider) -> ClientResult<Provider> {
        self.record(BackendCall::CreateProvider(provider.clone()))?;
        let mut state = self.state.borrow_mut();
        let created = Provider {
            provider_id: state.allocate_id(),
            name: provider.name.clone(),
            url: provider.url.clone(),
            token_id: provider.token_id,
        };
        state.providers.push(created.clone());
        Ok(created)
    }

    fn update_provider(
        &self,
        provider_id: u64,
        provider: &NewProvider,
    ) -> ClientResult<Provider> {
        self.record(BackendCall::UpdateProvider(provider_id, provider.clone()))?;
        let mut state = self.state.borrow_mut();
        let stored = state
            .providers
            .iter_mut()
            .find(|stored| stored.provider_id == provider_id)
            .ok_or_else(|| ClientError::NotFound(format!("provider {provider_id}")))?;
        stored.name = provider.name.clone();
        stored.url = provider.url.clone();
        stored.token_id = provider.token_id;
        Ok(stored.clone())
    }

    fn get_project(&self, project_id: u64) -> ClientResult<Project> {
        self.record(BackendCall::GetProject(project_id))?;
        self.state
            .borrow()
            .projects
            .iter()
            .find(|project| project.project_id == project_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("project {project_id}")))
    }

    fn create_project(&self, project: &NewProject) -> ClientResult<Project> {
        self.record(BackendCall::CreateProject(project.clone()))?;
        if self.failing_projects.contains(&project.name) {
            return Err(anyhow::anyhow!("backend rejected project {}", project.name).into());
        }
        let mut state = self.state.borrow_mut();
        let existing = state.projects.iter_mut().find(|stored| {
            stored.name == project.name
                && stored.group_name == project.group_name
                && stored.provider_id == project.provider_id
        });
        if let Some(stored) = existing {
            apply_project(stored, project);
            return Ok(stored.clone());
        }
        let mut created = Project {
            project_id: state.allocate_id(),
            ..Project::default()
        };
        apply_project(&mut created, project);
        state.projects.push(created.clone());
        Ok(created)
    }

    fn update_project(&self, project_id: u64, project: &NewProject) -> ClientResult<Project> {
        self.record(BackendCall::UpdateProject(project_id, project.clone()))?;
        let mut state = self.state.borrow_mut();
        let stored = state
            .projects
            .iter_mut()
            .find(|stored| stored.project_id == project_id)
            .ok_or_else(|| ClientError::NotFound(format!("project {project_id}")))?;
        apply_project(stored, project);
        Ok(stored.clone())
    }

    fn create_project_branch(&self, project_id: u64, branch: &NewBranch) -> ClientResult<Branch> {
        self.record(BackendCall::CreateProjectBranch(project_id, branch.clone()))?;
        if self.failing_branches.contains(&branch.name) {
            return Err(anyhow::anyhow!("backend rejected branch {}", branch.name).into());
        }
        let mut state = self.state.borrow_mut();
        if let Some(stored) = state
            .branches
            .iter_mut()
            .find(|stored| stored.project_id == project_id && stored.name == branch.name)
        {
            stored.default = branch.default;
            return Ok(stored.clone());
        }
        let created = Branch {
            branch_id: state.allocate_id(),
            project_id,
            name: branch.name.clone(),
            default: branch.default,
        };
        state.branches.push(created.clone());
        Ok(created)
    }

    fn update_project_branch_list(
        &self,
        project_id: u64,
        branches: &[NewBranch],
    ) -> ClientResult<Vec<Branch>> {
        self.record(BackendCall::UpdateProjectBranchList(
            project_id,
            branches.to_vec(),
        ))?;
        let mut state = self.state.borrow_mut();
        if !state
            .projects
            .iter()
            .any(|project| project.project_id == project_id)
        {
            return Err(ClientError::NotFound(format!("project {project_id}")));
        }
        state.branches.retain(|branch| branch.project_id != project_id);
        let mut replaced = Vec::with_capacity(branches.len());
        for branch in branches {
            let created = Branch {
                branch_id: state.allocate_id(),
                project_id,
                name: branch.name.clone(),
                default: branch.default,
            };
            state.branches.push(created.clone());
            replaced.push(created);
        }
        Ok(replaced)
    }
}
