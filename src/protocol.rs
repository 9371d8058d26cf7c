// src/protocol.rs
//!
//! Messages exchanged between the controller and the compile worker.
//!
//! Both directions are tagged unions. Serialized with `serde_json` they take
//! the shapes
//!
//! ```text
//! { "type": "compile", "id", "source", "styles": [{ "name", "safeName", "content" }], "buildId" }
//! { "type": "log",    "text", "id" }
//! { "type": "status", "text", "id" }
//! { "type": "result", "pdf", "size", "id" }
//! { "type": "error",  "message", "id" }
//! ```
//!
//! Every event echoes the id of the job it belongs to.

use serde::{Deserialize, Serialize};

/// Monotonically increasing compile job identifier.
pub type JobId = u64;

/// One style resource as shipped to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleEntry {
    /// The name the user uploaded the file under.
    pub name: String,
    /// The collision-free file name inside the working directory.
    #[serde(default)]
    pub safe_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub id: JobId,
    pub source: String,
    #[serde(default)]
    pub styles: Vec<StyleEntry>,
    /// Build version selecting the engine and format blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

/// Controller to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Compile(CompileRequest),
}

impl WorkerRequest {
    pub fn id(&self) -> JobId {
        match self {
            WorkerRequest::Compile(request) => request.id,
        }
    }
}

/// Worker to controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    Log { text: String, id: JobId },
    Status { text: String, id: JobId },
    /// The rendered document. `size` is the byte length of `pdf`.
    #[serde(rename = "result")]
    Output { pdf: Vec<u8>, size: usize, id: JobId },
    Error { message: String, id: JobId },
}

impl WorkerEvent {
    pub fn log(id: JobId, text: impl Into<String>) -> Self {
        WorkerEvent::Log { text: text.into(), id }
    }

    pub fn status(id: JobId, text: impl Into<String>) -> Self {
        WorkerEvent::Status { text: text.into(), id }
    }

    pub fn output(id: JobId, pdf: Vec<u8>) -> Self {
        WorkerEvent::Output {
            size: pdf.len(),
            pdf,
            id,
        }
    }

    pub fn error(id: JobId, message: impl Into<String>) -> Self {
        WorkerEvent::Error {
            message: message.into(),
            id,
        }
    }

    pub fn id(&self) -> JobId {
        match self {
            WorkerEvent::Log { id, .. }
            | WorkerEvent::Status { id, .. }
            | WorkerEvent::Output { id, .. }
            | WorkerEvent::Error { id, .. } => *id,
        }
    }

    /// `result` and `error` end a job; nothing follows them for that id.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Output { .. } | WorkerEvent::Error { .. })
    }
}
