use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── VPS ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Vps {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<VpsStatus>,
    #[serde(rename = "Network", default)]
    pub network: Vec<Network>,
    #[serde(rename = "OS", default)]
    pub os: Option<OsInfo>,
    #[serde(default)]
    pub configuration: Option<VpsConfiguration>,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: Option<String>,
    #[serde(rename = "SuperPassword", default)]
    pub super_password: Option<String>,
}

impl Vps {
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First address of the first interface.
    pub fn primary_ip(&self) -> Option<&str> {
        self.network
            .first()?
            .addresses
            .first()?
            .ip_address
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VpsStatus {
    #[serde(rename = "PendingAction", default)]
    pub pending_action: Option<Value>,
    #[serde(rename = "CurrentAction", default)]
    pub current_action: Option<String>,
    #[serde(rename = "Domstate", default)]
    pub domstate: Option<String>,
}

impl VpsStatus {
    /// A queued action the hypervisor has not picked up yet.
    pub fn is_pending(&self) -> bool {
        let queued = match &self.pending_action {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        queued && self.current_action.as_deref() == Some("nothing")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    #[serde(rename = "Addresses", default)]
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "IpAddress", default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsInfo {
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
}

/// Sizes arrive as numbers or as numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VpsConfiguration {
    #[serde(rename = "RamMb", default, deserialize_with = "opt_number")]
    pub ram_mb: Option<u64>,
    #[serde(rename = "CpuCores", default, deserialize_with = "opt_number")]
    pub cpu_cores: Option<u64>,
    #[serde(rename = "OsDiskSizeGb", default, deserialize_with = "opt_number")]
    pub os_disk_size_gb: Option<u64>,
    #[serde(default)]
    pub location: Option<String>,
}

fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as u64),
        _ => None,
    })
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVpsRequest {
    pub configuration: AddVpsConfiguration,
    pub for_user: Option<String>,
    pub options: AddVpsOptions,
    pub period_months: u32,
    #[serde(rename = "type")]
    pub vps_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddVpsConfiguration {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddVpsOptions {
    pub os: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AddVpsResponse {
    #[serde(default)]
    pub result: Value,
}

// ── Sizes ────────────────────────────────────────────────────────────

/// VPS product types, keyed by the memory size in GB they are sold as.
pub const VPS_TYPES: &[(&str, &str)] = &[
    ("1", "vps-a"),
    ("2", "vps-b"),
    ("4", "vps-c"),
    ("6", "vps-d"),
    ("8", "vps-e"),
    ("10", "vps-f"),
    ("12", "vps-g"),
    ("16", "vps-h"),
    ("20", "vps-i"),
];

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn configuration_accepts_numeric_strings() {
        let config: VpsConfiguration = serde_json::from_value(json!({
            "RamMb": "4096",
            "CpuCores": 2,
            "OsDiskSizeGb": "80.0",
            "location": "Gloucester, GB"
        }))
        .unwrap();

        assert_eq!(config.ram_mb, Some(4096));
        assert_eq!(config.cpu_cores, Some(2));
        assert_eq!(config.os_disk_size_gb, Some(80));
    }

    #[test]
    fn configuration_tolerates_junk_sizes() {
        let config: VpsConfiguration =
            serde_json::from_value(json!({ "RamMb": null, "CpuCores": "n/a" })).unwrap();

        assert_eq!(config.ram_mb, None);
        assert_eq!(config.cpu_cores, None);
        assert_eq!(config.os_disk_size_gb, None);
    }
}
