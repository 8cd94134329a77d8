use serde::{Deserialize, Serialize};

// ── Instances ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub os_id: Option<u64>,
    /// MB.
    #[serde(default)]
    pub ram: Option<u64>,
    /// GB.
    #[serde(default)]
    pub disk: Option<u64>,
    #[serde(default)]
    pub vcpu_count: Option<u64>,
    #[serde(default)]
    pub main_ip: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub power_status: Option<String>,
    #[serde(default)]
    pub server_status: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Only returned by the create call.
    #[serde(default)]
    pub default_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InstanceEnvelope {
    pub instance: Instance,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    pub region: String,
    pub plan: String,
    pub os_id: u64,
    pub label: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UpgradesEnvelope {
    pub upgrades: Upgrades,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Upgrades {
    #[serde(default)]
    pub plans: Vec<String>,
}

// ── ISO ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IsoStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub iso_id: Option<String>,
}

impl IsoStatus {
    pub fn mounted_iso(&self) -> Option<&str> {
        self.iso_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IsoStatusEnvelope {
    pub iso_status: IsoStatus,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttachIsoRequest<'a> {
    pub iso_id: &'a str,
}

// ── Catalogs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingSystem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub vcpu_count: Option<u64>,
    #[serde(default)]
    pub ram: Option<u64>,
    #[serde(default)]
    pub disk: Option<u64>,
    #[serde(rename = "type", default)]
    pub plan_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIso {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Links {
    #[serde(default)]
    pub next: Option<String>,
}
