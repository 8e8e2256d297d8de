use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::ProtocolError;

/// Wire names of every message type the relay understands
pub const KNOWN_TYPES: [&str; 6] = [
    "reality_generated",
    "imagination_status_update",
    "metrics_update",
    "heartbeat",
    "heartbeat_response",
    "reality_status",
];

/// Typed envelope carried in WebSocket text frames.
///
/// Payloads stay opaque JSON; only the `type` tag is interpreted. Peers send
/// `timestamp` as epoch millis, fractional millis or ISO-8601 strings, so it
/// is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    RealityGenerated {
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    ImaginationStatusUpdate {
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    MetricsUpdate {
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    HeartbeatResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    RealityStatus {
        data: RealityStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
}

/// Snapshot pushed to newly attached downstream clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealityStatus {
    pub bridge_connected: bool,
    pub reality_generation: Value,
}

impl RelayEvent {
    /// Parse one inbound text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn heartbeat(timestamp: i64) -> Self {
        Self::Heartbeat {
            timestamp: Some(timestamp.into()),
        }
    }

    pub fn heartbeat_response(timestamp: i64) -> Self {
        Self::HeartbeatResponse {
            timestamp: Some(timestamp.into()),
        }
    }

    pub fn reality_status(status: RealityStatus, timestamp: i64) -> Self {
        Self::RealityStatus {
            data: status,
            timestamp: Some(timestamp.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RealityGenerated { .. } => "reality_generated",
            Self::ImaginationStatusUpdate { .. } => "imagination_status_update",
            Self::MetricsUpdate { .. } => "metrics_update",
            Self::Heartbeat { .. } => "heartbeat",
            Self::HeartbeatResponse { .. } => "heartbeat_response",
            Self::RealityStatus { .. } => "reality_status",
        }
    }

    /// Content events that get republished downstream
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Self::RealityGenerated { .. }
                | Self::ImaginationStatusUpdate { .. }
                | Self::MetricsUpdate { .. }
        )
    }
}

/// Wall-clock epoch milliseconds for wire timestamps
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
