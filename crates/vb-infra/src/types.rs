use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for string fields the backend did not report.
pub const UNKNOWN: &str = "Unknown";

/// Opaque provider-side instance identifier (Virtualizor VPS id, 20i VPS id,
/// Vultr instance UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonical lifecycle state. Every backend vocabulary maps onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Pending,
    Creating,
    Starting,
    Running,
    Stopping,
    Off,
    Suspended,
    Rebuilding,
    Restarting,
    Unknown,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Off => "off",
            Self::Suspended => "suspended",
            Self::Rebuilding => "rebuilding",
            Self::Restarting => "restarting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a remote instance. Built fresh on every call, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub instance_id: InstanceId,
    pub state: ServerState,
    pub suspended: bool,
    pub label: String,
    pub hostname: String,
    pub ip_address: String,
    pub image: String,
    pub size: String,
    pub location: String,
    pub node: Option<String>,
    pub virtualization_type: String,
    pub memory_mb: u64,
    pub cpu_cores: u64,
    pub disk_mb: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServerInfo {
    pub fn with_state(mut self, state: ServerState) -> Self {
        self.state = state;
        self
    }

    pub fn with_suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }
}

/// How to reach an instance. Exactly one variant per answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionInfo {
    Ssh {
        command: String,
        password: Option<String>,
    },
    Vnc {
        host: String,
        port: u16,
        password: Option<String>,
    },
    Redirect {
        url: String,
    },
    FormPost {
        url: String,
        params: BTreeMap<String, String>,
    },
}

/// A successful lifecycle answer: a human message plus the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply<T> {
    pub message: String,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn new(message: impl Into<String>, value: T) -> Self {
        Self {
            message: message.into(),
            value,
        }
    }
}

/// What is currently mounted in an instance's virtual CD drive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsoStatus {
    pub iso_id: Option<String>,
    pub state: String,
}

// ── Operation parameters ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateParams {
    pub label: String,
    /// Plan id or name.
    pub size: String,
    /// OS template / image id or name.
    pub image: String,
    /// Region, server group or host server, depending on the backend.
    pub location: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub virtualization_type: Option<String>,
    #[serde(default)]
    pub root_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionParams {
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub application_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordParams {
    pub root_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResizeParams {
    pub size: String,
    #[serde(default)]
    pub resize_running: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReinstallParams {
    pub image: String,
}
