use crate::http::{HttpSettings, build_client, send};
use anyhow::Context;
use gitlab_import_core::model::{
    Branch, NewBranch, NewProject, NewProvider, NewToken, Project, Provider, Token,
};
use gitlab_import_core::provider::{BackendClient, ClientResult};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::debug;

/// REST client for the build-orchestration backend.
///
/// The caller's `Authorization` header is forwarded untouched on every call.
pub struct BackendHttpClient {
    client: Client,
    api_url: String,
    authorization: Option<String>,
}

impl BackendHttpClient {
    pub fn new(
        api_url: &str,
        authorization: Option<String>,
        settings: &HttpSettings,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(settings)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            authorization: authorization.filter(|value| !value.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.api_url));
        match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value.as_str()),
            None => request,
        }
    }

    fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ClientResult<T> {
        debug!(what, "calling backend");
        let response = send(request, what)?;
        Ok(response
            .json()
            .with_context(|| format!("decode {what} response"))?)
    }
}

impl BackendClient for BackendHttpClient {
    fn get_token_by_id(&self, token_id: u64) -> ClientResult<Token> {
        self.call(
            self.request(Method::GET, &format!("/token/{token_id}")),
            &format!("token {token_id}"),
        )
    }

    fn list_tokens(&self) -> ClientResult<Vec<Token>> {
        self.call(self.request(Method::GET, "/token"), "list tokens")
    }

    fn create_token(&self, token: &NewToken) -> ClientResult<Token> {
        self.call(
            self.request(Method::POST, "/token").json(token),
            "create token",
        )
    }

    fn update_token(&self, token_id: u64, token: &NewToken) -> ClientResult<Token> {
        self.call(
            self.request(Method::PUT, &format!("/token/{token_id}"))
                .json(token),
            &format!("token {token_id}"),
        )
    }

    fn get_provider_by_id(&self, provider_id: u64) -> ClientResult<Provider> {
        self.call(
            self.request(Method::GET, &format!("/provider/{provider_id}")),
            &format!("provider {provider_id}"),
        )
    }

    fn list_providers(&self) -> ClientResult<Vec<Provider>> {
        self.call(self.request(Method::GET, "/provider"), "list providers")
    }

    fn create_provider(&self, provider: &NewProvider) -> ClientResult<Provider> {
        self.call(
            self.request(Method::POST, "/provider").json(provider),
            "create provider",
        )
    }

    fn update_provider(
        &self,
        provider_id: u64,
        provider: &NewProvider,
    ) -> ClientResult<Provider> {
        self.call(
            self.request(Method::PUT, &format!("/provider/{provider_id}"))
                .json(provider),
            &format!("provider {provider_id}"),
        )
    }

    fn get_project(&self, project_id: u64) -> ClientResult<Project> {
        self.call(
            self.request(Method::GET, &format!("/project/{project_id}")),
            &format!("project {project_id}"),
        )
    }

    fn create_project(&self, project: &NewProject) -> ClientResult<Project> {
        self.call(
            self.request(Method::PUT, "/project").json(project),
            &format!("put project {}", project.name),
        )
    }

    fn update_project(&self, project_id: u64, project: &NewProject) -> ClientResult<Project> {
        self.call(
            self.request(Method::PUT, &format!("/project/{project_id}"))
                .json(project),
            &format!("project {project_id}"),
        )
    }

    fn create_project_branch(&self, project_id: u64, branch: &NewBranch) -> ClientResult<Branch> {
        self.call(
            self.request(Method::POST, &format!("/project/{project_id}/branch"))
                .json(branch),
            &format!("branch {} of project {project_id}", branch.name),
        )
    }

    fn update_project_branch_list(
        &self,
        project_id: u64,
        branches: &[NewBranch],
    ) -> ClientResult<Vec<Branch>> {
        self.call(
            self.request(Method::PUT, &format!("/project/{project_id}/branch"))
                .json(branches),
            &format!("branches of project {project_id}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::TestServer;
    use axum::extract::{Json, Path, Request};
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use axum::middleware::{self, Next};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post, put};
    use axum::Router;
    use gitlab_import_core::error::ClientError;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn require_auth(headers: HeaderMap, request: Request, next: Next) -> Response {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if authorization == Some("Bearer ok") {
            return next.run(request).await;
        }
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"wharf\""),
            )],
            Json(json!({ "title": "Unauthorized", "detail": "missing or invalid token" })),
        )
            .into_response()
    }

    fn backend_app() -> Router {
        let project_ids: Arc<Mutex<HashMap<(String, String, String), u64>>> = Arc::default();
        Router::new()
            .route(
                "/api/token",
                get(|| async {
                    Json(json!([{ "tokenId": 256, "token": "glpat", "userName": "jsmith" }]))
                })
                .post(|Json(body): Json<Value>| async move {
                    Json(json!({ "tokenId": 257, "token": body["token"], "userName": body["userName"] }))
                }),
            )
            .route(
                "/api/token/:id",
                get(|Path(id): Path<u64>| async move {
                    if id == 256 {
                        Json(json!({ "tokenId": 256, "token": "glpat" })).into_response()
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({ "detail": "no such token" })))
                            .into_response()
                    }
                })
                .put(|Path(id): Path<u64>, Json(body): Json<Value>| async move {
                    Json(json!({ "tokenId": id, "token": body["token"] }))
                }),
            )
            .route(
                "/api/provider",
                get(|| async {
                    Json(json!([{ "providerId": 1, "name": "gitlab", "url": "https://gitlab.local", "tokenId": 256 }]))
                })
                .post(|Json(body): Json<Value>| async move {
                    Json(json!({ "providerId": 2, "name": body["name"], "url": body["url"], "tokenId": body["tokenId"] }))
                }),
            )
            .route(
                "/api/provider/:id",
                get(|Path(id): Path<u64>| async move {
                    Json(json!({ "providerId": id, "name": "gitlab", "url": "https://gitlab.local" }))
                })
                .put(|Path(id): Path<u64>, Json(body): Json<Value>| async move {
                    Json(json!({ "providerId": id, "name": body["name"], "url": body["url"], "tokenId": body["tokenId"] }))
                }),
            )
            .route(
                "/api/project",
                put(move |Json(body): Json<Value>| {
                    let project_ids = project_ids.clone();
                    async move {
                        if body["name"] == "broken" {
                            return (StatusCode::INTERNAL_SERVER_ERROR, "database down")
                                .into_response();
                        }
                        let key = (
                            body["name"].to_string(),
                            body["groupName"].to_string(),
                            body["providerId"].to_string(),
                        );
                        let id = {
                            let mut ids = project_ids.lock().unwrap();
                            let next_id = 100 + ids.len() as u64;
                            *ids.entry(key).or_insert(next_id)
                        };
                        let mut stored = body.clone();
                        stored["projectId"] = json!(id);
                        Json(stored).into_response()
                    }
                }),
            )
            .route(
                "/api/project/:id",
                get(|Path(id): Path<u64>| async move {
                    Json(json!({ "projectId": id, "name": "docs", "groupName": "default" }))
                })
                .put(|Path(id): Path<u64>, Json(body): Json<Value>| async move {
                    let mut stored = body.clone();
                    stored["projectId"] = json!(id);
                    Json(stored)
                }),
            )
            .route(
                "/api/project/:id/branch",
                post(|Path(id): Path<u64>, Json(body): Json<Value>| async move {
                    Json(json!({ "branchId": 7, "projectId": id, "name": body["name"], "default": body["default"] }))
                })
                .put(|Path(id): Path<u64>, Json(body): Json<Vec<Value>>| async move {
                    let branches: Vec<Value> = body
                        .iter()
                        .enumerate()
                        .map(|(index, branch)| {
                            json!({ "branchId": index + 1, "projectId": id, "name": branch["name"], "default": branch["default"] })
                        })
                        .collect();
                    Json(branches)
                }),
            )
            .layer(middleware::from_fn(require_auth))
    }

    fn client(server: &TestServer, authorization: &str) -> BackendHttpClient {
        BackendHttpClient::new(
            &server.url("/api/"),
            Some(authorization.to_string()),
            &HttpSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn tokens_are_listed_fetched_created_and_updated() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");

        assert_eq!(backend.list_tokens().unwrap()[0].user_name, "jsmith");
        assert_eq!(backend.get_token_by_id(256).unwrap().token, "glpat");
        let created = backend
            .create_token(&NewToken {
                token: "fresh".to_string(),
                user_name: "jsmith".to_string(),
            })
            .unwrap();
        assert_eq!(created.token_id, 257);
        assert_eq!(created.user_name, "jsmith");
        let updated = backend
            .update_token(
                256,
                &NewToken {
                    token: "rotated".to_string(),
                    user_name: String::new(),
                },
            )
            .unwrap();
        assert_eq!(updated.token, "rotated");
    }

    #[test]
    fn unknown_token_is_not_found() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");

        let err = backend.get_token_by_id(9).unwrap_err();
        assert_eq!(err.to_string(), "token 9 not found");
    }

    #[test]
    fn providers_round_trip_through_endpoints() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");

        assert_eq!(backend.list_providers().unwrap()[0].token_id, 256);
        assert_eq!(backend.get_provider_by_id(4).unwrap().provider_id, 4);
        let created = backend
            .create_provider(&NewProvider {
                name: "gitlab".to_string(),
                url: "https://gitlab.example.com".to_string(),
                token_id: 257,
            })
            .unwrap();
        assert_eq!(created.provider_id, 2);
        assert_eq!(created.token_id, 257);
        let updated = backend
            .update_provider(
                2,
                &NewProvider {
                    name: "gitlab".to_string(),
                    url: "https://gitlab.example.org".to_string(),
                    token_id: 257,
                },
            )
            .unwrap();
        assert_eq!(updated.url, "https://gitlab.example.org");
    }

    #[test]
    fn projects_and_branches_use_camel_case_bodies() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");
        let project = NewProject {
            name: "web".to_string(),
            group_name: "default".to_string(),
            git_url: "git@gitlab.local:default/web.git".to_string(),
            remote_project_id: "12".to_string(),
            token_id: 256,
            provider_id: 1,
            ..NewProject::default()
        };

        let created = backend.create_project(&project).unwrap();
        assert_eq!(created.project_id, 100);
        assert_eq!(created.group_name, "default");
        assert_eq!(created.remote_project_id, "12");

        let fetched = backend.get_project(100).unwrap();
        assert_eq!(fetched.name, "docs");

        let updated = backend.update_project(100, &project).unwrap();
        assert_eq!(updated.git_url, "git@gitlab.local:default/web.git");

        let branch = backend
            .create_project_branch(
                100,
                &NewBranch {
                    name: "main".to_string(),
                    default: true,
                },
            )
            .unwrap();
        assert_eq!(branch.project_id, 100);
        assert!(branch.default);

        let replaced = backend
            .update_project_branch_list(
                100,
                &[
                    NewBranch {
                        name: "main".to_string(),
                        default: true,
                    },
                    NewBranch {
                        name: "develop".to_string(),
                        default: false,
                    },
                ],
            )
            .unwrap();
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced[1].name, "develop");
    }

    #[test]
    fn putting_a_known_project_updates_it_in_place() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");
        let project = |description: &str| NewProject {
            name: "web".to_string(),
            group_name: "default".to_string(),
            description: description.to_string(),
            provider_id: 1,
            ..NewProject::default()
        };

        let first = backend.create_project(&project("v1")).unwrap();
        let second = backend.create_project(&project("v2")).unwrap();
        let other = backend
            .create_project(&NewProject {
                group_name: "other".to_string(),
                ..project("v1")
            })
            .unwrap();

        assert_eq!(first.project_id, second.project_id);
        assert_eq!(second.description, "v2");
        assert_ne!(other.project_id, first.project_id);
    }

    #[test]
    fn server_errors_carry_status_and_body() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer ok");

        let err = backend
            .create_project(&NewProject {
                name: "broken".to_string(),
                ..NewProject::default()
            })
            .unwrap_err();

        assert!(matches!(err, ClientError::Request(_)));
        assert_eq!(
            err.to_string(),
            "put project broken returned 500 Internal Server Error: database down"
        );
    }

    #[test]
    fn rejected_authorization_carries_realm() {
        let server = TestServer::start(backend_app());
        let backend = client(&server, "Bearer expired");

        let err = backend.list_tokens().unwrap_err();

        assert_eq!(err.realm(), Some("Bearer realm=\"wharf\""));
        assert_eq!(
            err.to_string(),
            "unauthorized: list tokens: missing or invalid token"
        );
    }
}
