use crate::config::ServerConfig;
use crate::problem::ApiError;
use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use gitlab_import_core::bootstrap::obtain_credentials;
use gitlab_import_core::import_engine::Importer;
use gitlab_import_core::report::ImportReport;
use gitlab_import_core::request::{ImportIntent, ImportRequest};
use gitlab_import_core::trigger::{TriggerOutcome, handle_event};
use gitlab_import_providers::{BackendHttpClient, GitLabClient, HttpSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Runs one resolved import on a blocking thread.
pub trait ImportService: Send + Sync {
    fn import(
        &self,
        authorization: Option<String>,
        request: &ImportRequest,
        intent: &ImportIntent,
    ) -> Result<ImportReport, ApiError>;
}

/// Talks to the configured backend and to the GitLab instance the provider points at.
pub struct HttpImportService {
    api_url: String,
    http: HttpSettings,
}

impl HttpImportService {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            http: config.http_settings(),
        }
    }
}

impl ImportService for HttpImportService {
    fn import(
        &self,
        authorization: Option<String>,
        request: &ImportRequest,
        intent: &ImportIntent,
    ) -> Result<ImportReport, ApiError> {
        let backend = BackendHttpClient::new(&self.api_url, authorization, &self.http)
            .context("create backend client")
            .map_err(ApiError::Internal)?;
        let credentials = obtain_credentials(&backend, request)?;
        let gitlab = GitLabClient::new(
            &credentials.provider.url,
            &credentials.token.token,
            &self.http,
        )
        .context("create gitlab client")
        .map_err(ApiError::Internal)?;
        debug!(url = gitlab.base_url(), "gitlab client ready");
        let importer = Importer::new(&gitlab, &backend, credentials.mapper());
        Ok(importer.run(intent)?)
    }
}

#[derive(Clone)]
pub struct AppState {
    importer: Arc<dyn ImportService>,
}

impl AppState {
    pub fn new(importer: Arc<dyn ImportService>) -> Self {
        Self { importer }
    }
}

#[derive(Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub projects: usize,
    pub branches: usize,
}

#[derive(Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
}

pub fn router(state: AppState, allow_all_origins: bool) -> Router {
    let app = Router::new()
        .route("/", get(ping))
        .route("/import/gitlab", post(run_import))
        .route("/import/gitlab/trigger", post(run_trigger))
        .route("/import/gitlab/version", get(version))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if allow_all_origins {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn run_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let request: ImportRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid import body: {err}")))?;
    let intent = request.intent()?;
    info!(?intent, url = %request.url, "import requested");

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let importer = state.importer.clone();
    let report = tokio::task::spawn_blocking(move || {
        importer.import(authorization, &request, &intent)
    })
    .await
    .context("import task")
    .map_err(ApiError::Internal)??;

    Ok((
        StatusCode::CREATED,
        Json(ImportSummary {
            projects: report.projects,
            branches: report.branches,
        }),
    ))
}

async fn run_trigger(body: Bytes) -> Result<Json<Value>, ApiError> {
    debug!("gitlab triggered");
    let outcome = handle_event(&body)?;
    let response = match outcome {
        TriggerOutcome::RepositoryUpdated(update) => json!({
            "event": update.event_name,
            "handled": true,
            "project": update.project.name,
        }),
        TriggerOutcome::Ignored { event_name } => json!({
            "event": event_name,
            "handled": false,
        }),
    };
    debug!("gitlab trigger finished");
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use gitlab_import_core::doubles::{RecordingBackend, StubGitLab};
    use gitlab_import_core::model::{Namespace, RemoteBranch, RemoteProject};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Runs imports against in-memory doubles and remembers what it was asked.
    #[derive(Default)]
    struct FakeImports {
        rejecting: Option<String>,
        failing_project: Option<String>,
        seen: Mutex<Vec<(Option<String>, ImportIntent)>>,
    }

    impl ImportService for FakeImports {
        fn import(
            &self,
            authorization: Option<String>,
            request: &ImportRequest,
            intent: &ImportIntent,
        ) -> Result<ImportReport, ApiError> {
            self.seen
                .lock()
                .expect("seen lock")
                .push((authorization, intent.clone()));
            let gitlab = StubGitLab::new()
                .with_projects(vec![project(1, "web"), project(2, "docs")])
                .with_default_branches(vec![RemoteBranch {
                    name: "master".to_string(),
                    default: true,
                    ..RemoteBranch::default()
                }]);
            let mut backend = RecordingBackend::new();
            if let Some(realm) = &self.rejecting {
                backend = backend.rejecting(realm);
            }
            if let Some(name) = &self.failing_project {
                backend = backend.failing_project(name);
            }
            let credentials = obtain_credentials(&backend, request)?;
            Ok(Importer::new(&gitlab, &backend, credentials.mapper()).run(intent)?)
        }
    }

    fn project(id: u64, name: &str) -> RemoteProject {
        RemoteProject {
            id,
            name: name.to_string(),
            path: name.to_string(),
            namespace: Some(Namespace {
                full_path: "default".to_string(),
                ..Namespace::default()
            }),
            ..RemoteProject::default()
        }
    }

    fn app(imports: Arc<FakeImports>) -> Router {
        router(AppState::new(imports), true)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer caller")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let response = app(Arc::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn version_reports_crate_version() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .uri("/import/gitlab/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn group_import_returns_created_and_forwards_authorization() {
        let imports = Arc::new(FakeImports::default());
        let response = app(imports.clone())
            .oneshot(post_json(
                "/import/gitlab",
                r#"{"token":"glpat","url":"https://gitlab.local","group":"default"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            json_body(response).await,
            json!({ "projects": 2, "branches": 2 })
        );
        let seen = imports.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (
                Some("Bearer caller".to_string()),
                ImportIntent::Group {
                    group: "default".to_string()
                }
            )
        );
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let imports = Arc::new(FakeImports::default());
        let response = app(imports.clone())
            .oneshot(post_json("/import/gitlab", "{ nope"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
        assert!(imports.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn project_without_group_is_rejected_before_importing() {
        let imports = Arc::new(FakeImports::default());
        let response = app(imports.clone())
            .oneshot(post_json("/import/gitlab", r#"{"project":"web"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["type"], "/prob/provider/gitlab/invalid-import-request");
        assert!(imports.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_credentials_are_unauthorized_with_challenge() {
        let imports = Arc::new(FakeImports {
            rejecting: Some("Bearer realm=\"wharf\"".to_string()),
            ..FakeImports::default()
        });
        let response = app(imports)
            .oneshot(post_json("/import/gitlab", r#"{"token":"glpat"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Bearer realm=\"wharf\""
        );
    }

    #[tokio::test]
    async fn partial_failure_is_bad_gateway() {
        let imports = Arc::new(FakeImports {
            failing_project: Some("docs".to_string()),
            ..FakeImports::default()
        });
        let response = app(imports)
            .oneshot(post_json("/import/gitlab", r#"{"token":"glpat"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["type"], "/prob/provider/gitlab/partial-import");
        assert!(body["detail"].as_str().unwrap().contains("project 2 (docs)"));
    }

    #[tokio::test]
    async fn repository_update_trigger_is_acknowledged() {
        let response = app(Arc::default())
            .oneshot(post_json(
                "/import/gitlab/trigger",
                r#"{"event_name":"repository_update","project":{"name":"Example","namespace":"Jsmith"},"changes":[],"refs":["refs/heads/master"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "event": "repository_update", "handled": true, "project": "Example" })
        );
    }

    #[tokio::test]
    async fn unknown_trigger_event_is_ignored() {
        let response = app(Arc::default())
            .oneshot(post_json(
                "/import/gitlab/trigger",
                r#"{"event_name":"project_create"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["handled"], false);
    }

    #[tokio::test]
    async fn push_hook_without_event_name_is_ignored() {
        let response = app(Arc::default())
            .oneshot(post_json(
                "/import/gitlab/trigger",
                r#"{"object_kind":"push","ref":"refs/heads/master"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "event": "", "handled": false })
        );
    }

    #[tokio::test]
    async fn repository_update_with_null_description_is_acknowledged() {
        let response = app(Arc::default())
            .oneshot(post_json(
                "/import/gitlab/trigger",
                r#"{"event_name":"repository_update","project":{"name":"Example","description":null,"namespace":"Jsmith"},"changes":[],"refs":["refs/heads/master"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["handled"], true);
    }

    #[tokio::test]
    async fn malformed_trigger_is_bad_request() {
        let response = app(Arc::default())
            .oneshot(post_json("/import/gitlab/trigger", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered_when_allowed() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/import/gitlab")
                    .header(header::ORIGIN, "https://wharf.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
