//! Wire messages exchanged with kernel processes.
//!
//! Newline-delimited JSON over stdin/stdout. Every line is one message shaped
//! like a Jupyter message, plus a `channel` field naming the stream it
//! belongs to (`shell` for request/reply, `iopub` for broadcast telemetry).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Logical stream a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/reply ("control") stream.
    Shell,
    /// Broadcast event ("telemetry") stream.
    Iopub,
}

/// Message header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Unique message id.
    pub msg_id: String,
    /// Message kind, e.g. `execute_request` or `stream`.
    #[serde(default)]
    pub msg_type: String,
}

/// Header of the request that caused a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentHeader {
    /// Id of the originating request, absent for unsolicited messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}

/// One line of the kernel wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Stream the message belongs to.
    pub channel: Channel,
    /// Message header.
    pub header: Header,
    /// Header of the originating request.
    #[serde(default)]
    pub parent_header: ParentHeader,
    /// Kind-specific payload.
    #[serde(default)]
    pub content: Value,
}

impl WireMessage {
    /// Build a request on the shell channel with a fresh message id.
    pub fn request(msg_type: &str, content: Value) -> Self {
        Self {
            channel: Channel::Shell,
            header: Header {
                msg_id: uuid::Uuid::new_v4().to_string(),
                msg_type: msg_type.to_string(),
            },
            parent_header: ParentHeader::default(),
            content,
        }
    }

    /// Request execution of a code fragment.
    pub fn execute_request(code: &str) -> Self {
        Self::request(
            "execute_request",
            json!({
                "code": code,
                "silent": false,
                "store_history": true,
            }),
        )
    }

    /// Ask the kernel to exit.
    pub fn shutdown_request() -> Self {
        Self::request("shutdown_request", json!({ "restart": false }))
    }

    /// Message kind.
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Id of the request this message answers, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_header.msg_id.as_deref()
    }
}

/// Handle for a request sent on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap a message id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying message id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status carried by an `execute_reply`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyStatus {
    /// The fragment ran to completion.
    Ok,
    /// The fragment raised, or the kernel aborted it.
    Error {
        /// Exception name.
        ename: String,
        /// Exception message.
        evalue: String,
        /// Formatted traceback lines.
        traceback: Vec<String>,
    },
}

#[derive(Deserialize)]
struct ReplyContent {
    status: String,
    #[serde(default)]
    ename: String,
    #[serde(default)]
    evalue: String,
    #[serde(default)]
    traceback: Vec<String>,
}

impl ReplyStatus {
    /// Decode the content of an `execute_reply`.
    pub fn from_content(content: Value) -> Result<Self> {
        let reply: ReplyContent = serde_json::from_value(content)?;
        match reply.status.as_str() {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error {
                ename: reply.ename,
                evalue: reply.evalue,
                traceback: reply.traceback,
            }),
            "aborted" => Ok(Self::Error {
                ename: "Aborted".to_string(),
                evalue: "execution aborted by kernel".to_string(),
                traceback: reply.traceback,
            }),
            other => Err(Error::Protocol(format!("unknown reply status '{}'", other))),
        }
    }
}

/// A classified event from the telemetry channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    /// Id of the request that caused the event.
    pub parent_id: Option<String>,
    /// The event itself.
    pub kind: TelemetryKind,
}

/// Telemetry event kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryKind {
    /// Kernel busy/idle transitions.
    Status { execution_state: String },
    /// Echo of the submitted code.
    ExecuteInput,
    /// The kernel cleared its display.
    ClearOutput { wait: bool },
    /// Text written to stdout or stderr.
    Stream { name: String, text: String },
    /// Rich display payload.
    DisplayData {
        data: Map<String, Value>,
        metadata: Map<String, Value>,
    },
    /// Value of the fragment's last expression.
    ExecuteResult {
        data: Map<String, Value>,
        metadata: Map<String, Value>,
        execution_count: Option<u32>,
    },
    /// An exception raised by the fragment.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    /// A kind this driver does not handle.
    Unknown { msg_type: String },
    /// A known kind whose content could not be decoded.
    Malformed { msg_type: String, reason: String },
}

#[derive(Deserialize)]
struct StatusContent {
    #[serde(default)]
    execution_state: String,
}

#[derive(Deserialize)]
struct ClearOutputContent {
    #[serde(default)]
    wait: bool,
}

#[derive(Deserialize)]
struct StreamContent {
    name: String,
    text: String,
}

#[derive(Deserialize)]
struct DisplayContent {
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    execution_count: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorContent {
    ename: String,
    evalue: String,
    #[serde(default)]
    traceback: Vec<String>,
}

impl TelemetryKind {
    fn decode(msg_type: &str, content: Value) -> serde_json::Result<Self> {
        let kind = match msg_type {
            "status" => {
                let c: StatusContent = serde_json::from_value(content)?;
                Self::Status {
                    execution_state: c.execution_state,
                }
            }
            "execute_input" => Self::ExecuteInput,
            "clear_output" => {
                let c: ClearOutputContent = serde_json::from_value(content)?;
                Self::ClearOutput { wait: c.wait }
            }
            "stream" => {
                let c: StreamContent = serde_json::from_value(content)?;
                Self::Stream {
                    name: c.name,
                    text: c.text,
                }
            }
            "display_data" => {
                let c: DisplayContent = serde_json::from_value(content)?;
                Self::DisplayData {
                    data: c.data,
                    metadata: c.metadata,
                }
            }
            "execute_result" => {
                let c: DisplayContent = serde_json::from_value(content)?;
                Self::ExecuteResult {
                    data: c.data,
                    metadata: c.metadata,
                    execution_count: c.execution_count,
                }
            }
            "error" => {
                let c: ErrorContent = serde_json::from_value(content)?;
                Self::Error {
                    ename: c.ename,
                    evalue: c.evalue,
                    traceback: c.traceback,
                }
            }
            other => Self::Unknown {
                msg_type: other.to_string(),
            },
        };
        Ok(kind)
    }
}

impl TelemetryMessage {
    /// Classify a message received on the iopub channel.
    pub fn from_wire(message: WireMessage) -> Self {
        let WireMessage {
            header,
            parent_header,
            content,
            ..
        } = message;

        let kind = TelemetryKind::decode(&header.msg_type, content).unwrap_or_else(|e| {
            TelemetryKind::Malformed {
                msg_type: header.msg_type.clone(),
                reason: e.to_string(),
            }
        });

        Self {
            parent_id: parent_header.msg_id,
            kind,
        }
    }
}

/// Write a message as one JSON line.
pub async fn write_message<W>(writer: &mut W, message: &WireMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');

    writer
        .write_all(&line)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write kernel message: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush kernel stream: {}", e)))?;

    Ok(())
}

/// Read the next message, skipping blank lines.
///
/// Returns `Ok(None)` once the stream is closed.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<WireMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Ipc(format!("Failed to read kernel message: {}", e)))?;
        if read == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return Ok(Some(serde_json::from_str(&line)?));
    }
}
