use crate::gitlab_paging::paging_from_headers;
use crate::http::{HttpSettings, build_client, send, send_allow_statuses};
use anyhow::Context;
use gitlab_import_core::model::{RemoteBranch, RemoteProject};
use gitlab_import_core::paging::Page;
use gitlab_import_core::provider::{
    BUILD_DEFINITION_FILE, ClientResult, DEFAULT_REF, GitLabFetcher,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

const API_PATH: &str = "/api/v4";

/// GitLab REST v4 client authenticating with a personal access token.
pub struct GitLabClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitLabClient {
    pub fn new(url: &str, token: &str, settings: &HttpSettings) -> anyhow::Result<Self> {
        if url.trim().is_empty() {
            anyhow::bail!("gitlab url is empty");
        }
        Ok(Self {
            client: build_client(settings)?,
            base_url: api_base_url(url),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("PRIVATE-TOKEN", self.token.as_str())
    }

    fn list<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        page: i64,
        what: &str,
    ) -> ClientResult<Page<T>> {
        let request = if page > 0 {
            request.query(&[("page", page)])
        } else {
            request
        };
        let response = send(request, what)?;
        let paging = paging_from_headers(response.headers());
        let items: Vec<T> = response
            .json()
            .with_context(|| format!("decode {what} response"))?;
        Ok(Page::new(items, paging))
    }
}

/// Appends the v4 API path to a GitLab instance URL unless it is already there.
pub fn api_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with(API_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{API_PATH}")
    }
}

impl GitLabFetcher for GitLabClient {
    fn list_projects(&self, page: i64) -> ClientResult<Page<RemoteProject>> {
        debug!(page, "listing projects");
        let request = self
            .get("/projects")
            .query(&[("order_by", "id"), ("sort", "asc")]);
        self.list(request, page, "list projects")
            .inspect_err(|err| error!(error = %err, page, "failed to list projects"))
    }

    fn list_projects_from_group(
        &self,
        group: &str,
        page: i64,
    ) -> ClientResult<Page<RemoteProject>> {
        debug!(group, page, "listing projects for group");
        let request = self.get("/projects").query(&[
            ("search_namespaces", "true"),
            ("search", group),
            ("order_by", "id"),
            ("sort", "asc"),
        ]);
        self.list(request, page, &format!("list projects of group {group}"))
            .inspect_err(|err| error!(error = %err, group, page, "failed to list projects for group"))
    }

    fn get_build_definition_if_exists(
        &self,
        project_id: u64,
        default_branch: &str,
    ) -> ClientResult<String> {
        let branch = if default_branch.is_empty() {
            debug!(project_id, "default branch is empty, using {DEFAULT_REF}");
            DEFAULT_REF
        } else {
            default_branch
        };
        let what = format!("{BUILD_DEFINITION_FILE} of project {project_id}");
        let request = self
            .get(&format!(
                "/projects/{project_id}/repository/files/{BUILD_DEFINITION_FILE}/raw"
            ))
            .query(&[("ref", branch)]);
        let response = send_allow_statuses(request, &what, &[StatusCode::NOT_FOUND])
            .inspect_err(|err| {
                error!(error = %err, project_id, branch, "unable to get build definition")
            })?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(project_id, branch, "no build definition");
            return Ok(String::new());
        }
        Ok(response.text().with_context(|| format!("read {what}"))?)
    }

    fn get_branches(&self, project_id: u64, page: i64) -> ClientResult<Page<RemoteBranch>> {
        let request = self.get(&format!("/projects/{project_id}/repository/branches"));
        self.list(request, page, &format!("list branches of project {project_id}"))
            .inspect_err(|err| error!(error = %err, project_id, page, "failed to list branches"))
    }
}
