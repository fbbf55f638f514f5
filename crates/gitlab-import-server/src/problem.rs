use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use gitlab_import_core::error::ImportError;
use gitlab_import_core::trigger::TriggerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// RFC 7807 problem body.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Trigger(_) => StatusCode::BAD_REQUEST,
            ApiError::Import(ImportError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Import(err) if err.is_unauthorized() => StatusCode::UNAUTHORIZED,
            ApiError::Import(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_problem(&self) -> Problem {
        let (kind, title) = match self {
            ApiError::BadRequest(_) => ("invalid-request-body", "Invalid request body."),
            ApiError::Trigger(_) => ("invalid-trigger-event", "Invalid trigger event."),
            ApiError::Import(ImportError::InvalidRequest(_)) => {
                ("invalid-import-request", "Invalid import request.")
            }
            ApiError::Import(err) if err.is_unauthorized() => {
                ("unauthorized", "Unauthorized.")
            }
            ApiError::Import(ImportError::GitLab(_)) => {
                ("fetching-from-gitlab", "Error fetching from GitLab.")
            }
            ApiError::Import(ImportError::Backend(_)) => {
                ("backend-request-failed", "Backend request failed.")
            }
            ApiError::Import(ImportError::Partial(_)) => {
                ("partial-import", "Some records failed to import.")
            }
            ApiError::Internal(_) => ("creating-importer-error", "Unable to create importer."),
        };
        Problem {
            problem_type: format!("/prob/provider/gitlab/{kind}"),
            title: title.to_string(),
            status: self.status().as_u16(),
            detail: self.to_string(),
        }
    }

    fn challenge(&self) -> Option<String> {
        match self {
            ApiError::Import(err) => err.realm().map(|realm| {
                if realm.is_empty() {
                    "Bearer".to_string()
                } else {
                    realm.to_string()
                }
            }),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem = self.to_problem();
        if problem.status >= 500 {
            error!(status = problem.status, error = %self, "request failed");
        } else {
            warn!(status = problem.status, error = %self, "request rejected");
        }
        let mut response = (self.status(), Json(problem)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        if let Some(challenge) = self.challenge()
            && let Ok(value) = HeaderValue::from_str(&challenge)
        {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}
