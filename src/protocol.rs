//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{FormConfiguration, FormData};
use crate::merge::FieldOverride;
use crate::progression::{
    FieldChangeOutcome, ProgressionPhase, SectionCompletion, SubmissionReadiness,
};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    FieldChange {
        #[serde(rename = "fieldId")]
        field_id: String,
        value: Value,
    },
    Completion,
    SectionCompletion {
        #[serde(rename = "sectionId")]
        section_id: String,
    },
    Readiness,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SessionOpened {
        #[serde(rename = "sessionId")]
        session_id: String,
        config: FormConfiguration,
        phase: ProgressionPhase,
    },
    FieldChangeResult {
        #[serde(flatten)]
        outcome: FieldChangeOutcome,
    },
    Completion {
        #[serde(rename = "completionPercentage")]
        completion_percentage: u32,
    },
    SectionCompletion {
        #[serde(rename = "sectionId")]
        section_id: String,
        #[serde(flatten)]
        completion: SectionCompletion,
    },
    Readiness {
        #[serde(flatten)]
        readiness: SubmissionReadiness,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Deserialize)]
pub struct ValidateIn {
    pub config: FormConfiguration,
}

#[derive(Serialize)]
pub struct ValidateOut {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Admin preview/save payload: base config plus merge inputs.
#[derive(Deserialize)]
pub struct MergeIn {
    pub config: FormConfiguration,
    #[serde(default)]
    pub overrides: HashMap<String, FieldOverride>,
    #[serde(default = "default_include_background")]
    pub include_background: bool,
}

fn default_include_background() -> bool {
    true
}

#[derive(Deserialize)]
pub struct PresetMetadataIn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ReorderIn {
    pub ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct DetectFieldIn {
    pub text: String,
}

#[derive(Serialize)]
pub struct DetectFieldOut {
    #[serde(rename = "fieldId")]
    pub field_id: Option<String>,
}

#[derive(Deserialize)]
pub struct BackgroundSelectionIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub field_of_study: String,
    pub class_level: String,
    #[serde(default)]
    pub learning_goals: Vec<String>,
}

#[derive(Deserialize)]
pub struct SessionOpenIn {
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct SessionOpenOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub config: FormConfiguration,
    pub phase: ProgressionPhase,
}

#[derive(Deserialize)]
pub struct FieldChangeIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "fieldId")]
    pub field_id: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SectionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "sectionId")]
    pub section_id: String,
}

#[derive(Serialize)]
pub struct CompletionOut {
    #[serde(rename = "completionPercentage")]
    pub completion_percentage: u32,
}

/// Snapshot of a session for debugging/inspection.
#[derive(Serialize)]
pub struct SessionStateOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub phase: ProgressionPhase,
    pub form_data: FormData,
    pub config: FormConfiguration,
}
