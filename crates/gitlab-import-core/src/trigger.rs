//! GitLab system hook events posted to the trigger endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const REPOSITORY_UPDATE_EVENT: &str = "repository_update";

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("could not read event: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("could not read {event} event: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Only the event name is read here; hooks without one carry an empty name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventEnvelope {
    #[serde(deserialize_with = "null_as_empty")]
    pub event_name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatedProject {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub ssh_url: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefChange {
    #[serde(deserialize_with = "null_as_empty")]
    pub before: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub after: String,
    #[serde(rename = "ref", deserialize_with = "null_as_empty")]
    pub reference: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryUpdate {
    pub event_name: String,
    pub project: UpdatedProject,
    pub changes: Vec<RefChange>,
    pub refs: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TriggerOutcome {
    RepositoryUpdated(RepositoryUpdate),
    Ignored { event_name: String },
}

/// Reads the event name, then the typed payload for events this service knows.
///
/// Unknown events are acknowledged and otherwise ignored.
pub fn handle_event(body: &[u8]) -> Result<TriggerOutcome, TriggerError> {
    let envelope: EventEnvelope = serde_json::from_slice(body).map_err(TriggerError::Envelope)?;
    info!(event = %envelope.event_name, "got event");

    match envelope.event_name.as_str() {
        REPOSITORY_UPDATE_EVENT => {
            let update: RepositoryUpdate =
                serde_json::from_slice(body).map_err(|source| TriggerError::Payload {
                    event: envelope.event_name.clone(),
                    source,
                })?;
            info!(
                project = %update.project.name,
                namespace = %update.project.namespace,
                refs = ?update.refs,
                "repository updated"
            );
            Ok(TriggerOutcome::RepositoryUpdated(update))
        }
        _ => {
            debug!(event = %envelope.event_name, "ignoring event");
            Ok(TriggerOutcome::Ignored {
                event_name: envelope.event_name,
            })
        }
    }
}
