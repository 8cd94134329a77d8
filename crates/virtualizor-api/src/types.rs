use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Catalogs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    #[serde(deserialize_with = "de::string")]
    pub plid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub plan_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub virt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerGroup {
    #[serde(deserialize_with = "de::string")]
    pub sgid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub sg_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostServer {
    #[serde(deserialize_with = "de::string")]
    pub serid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub server_name: String,
    /// JSON document (`{"city":..,"state":..,"country_code":..}`) or a plain string.
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsTemplate {
    #[serde(default, deserialize_with = "de::string")]
    pub osid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlansPage {
    #[serde(default, deserialize_with = "de::entries")]
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerGroupsPage {
    #[serde(default, deserialize_with = "de::entries")]
    pub servergroups: Vec<ServerGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServersPage {
    #[serde(default, deserialize_with = "de::entries")]
    pub servs: Vec<HostServer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanFilter {
    pub name: Option<String>,
    pub virt: Option<String>,
}

// ── Virtual servers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Vps {
    #[serde(deserialize_with = "de::string")]
    pub vpsid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub vps_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub os_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub virt: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    pub plid: String,
    #[serde(default, deserialize_with = "de::string")]
    pub serid: String,
    #[serde(default, deserialize_with = "de::flag")]
    pub suspended: bool,
    #[serde(default, deserialize_with = "de::entries")]
    pub ips: Vec<String>,
    #[serde(default, deserialize_with = "de::number")]
    pub ram: u64,
    #[serde(default, deserialize_with = "de::number")]
    pub cores: u64,
    /// Disk in GB.
    #[serde(default, deserialize_with = "de::number")]
    pub space: u64,
    #[serde(default, deserialize_with = "de::optional")]
    pub stats: Option<VpsStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VpsStats {
    #[serde(default, deserialize_with = "de::opt_number")]
    pub status: Option<u64>,
}

/// Everything `editvs` returns about one VPS, including the plan and host
/// server catalogs it references.
#[derive(Debug, Clone, Deserialize)]
pub struct VpsDetails {
    pub vps: Vps,
    #[serde(default, deserialize_with = "de::entries")]
    pub plans: Vec<Plan>,
    #[serde(default, deserialize_with = "de::entries")]
    pub servers: Vec<HostServer>,
}

impl VpsDetails {
    pub fn plan(&self) -> Option<&Plan> {
        self.plans.iter().find(|p| p.plid == self.vps.plid)
    }

    pub fn server(&self) -> Option<&HostServer> {
        self.servers.iter().find(|s| s.serid == self.vps.serid)
    }
}

#[derive(Debug, Clone)]
pub struct CreateVpsRequest {
    pub virt: String,
    pub plid: String,
    pub osid: String,
    pub server_group: Option<String>,
    pub slave_server: Option<String>,
    pub hostname: String,
    pub user_email: String,
    pub root_password: String,
}

/// Outcome of a mutating call. `done` is whatever truthy value the panel
/// chose to return (a flag, the new VPS id, a nested object...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub done: Value,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub done_msg: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub vpsid: Option<String>,
}

impl ActionResult {
    pub fn is_done(&self) -> bool {
        de::truthy(&self.done)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VncInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub port: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SsoToken {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub sid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub token_key: Option<String>,
}

// ── Lenient decoding ─────────────────────────────────────────────────

/// The panel is a PHP application: ids arrive as strings or numbers, flags as
/// `"0"`/`1`/`true`, and collections as JSON objects keyed by id or as lists
/// (an empty PHP array even serializes as `[]` where an object is expected).
pub(crate) mod de {
    use super::*;

    pub fn truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    fn scalar_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn scalar_number(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as u64),
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(scalar_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_string(Value::deserialize(d)?))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(scalar_number(&Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(scalar_number(&Value::deserialize(d)?))
    }

    /// `None` for anything that is not a well-formed `T` (notably `[]`).
    pub fn optional<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).ok())
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(truthy(&Value::deserialize(d)?))
    }

    /// A list, or the values of an id-keyed object.
    pub fn entries<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let items = match Value::deserialize(d)? {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => return Ok(Vec::new()),
        };
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn editvs_payload_with_mixed_encodings() {
        let raw = json!({
            "vps": {
                "vpsid": 42,
                "vps_name": "v1042",
                "hostname": "web1.example.com",
                "os_name": "ubuntu-22.04-x86_64",
                "virt": "kvm",
                "plid": "3",
                "serid": 0,
                "suspended": "0",
                "ips": { "17": "203.0.113.5" },
                "ram": "2048",
                "cores": 2,
                "space": "40",
                "stats": { "status": "1" }
            },
            "plans": { "3": { "plid": "3", "plan_name": "vps-c", "virt": "kvm" } },
            "servers": [ { "serid": "0", "server_name": "node-a", "location": null } ]
        });

        let details: VpsDetails = serde_json::from_value(raw).unwrap();
        assert_eq!(details.vps.vpsid, "42");
        assert!(!details.vps.suspended);
        assert_eq!(details.vps.ips, vec!["203.0.113.5".to_string()]);
        assert_eq!(details.vps.ram, 2048);
        assert_eq!(details.vps.stats.as_ref().unwrap().status, Some(1));
        assert_eq!(details.plan().unwrap().plan_name, "vps-c");
        assert_eq!(details.server().unwrap().server_name, "node-a");
    }

    #[test]
    fn id_keyed_collections_keep_response_order() {
        let raw = json!({
            "vpsid": "42",
            "ips": { "98": "203.0.113.1", "102": "203.0.113.2" }
        });
        let vps: Vps = serde_json::from_value(raw).unwrap();
        assert_eq!(vps.ips, vec!["203.0.113.1".to_string(), "203.0.113.2".to_string()]);

        let page: PlansPage = serde_json::from_value(json!({
            "plans": {
                "9": { "plid": "9", "plan_name": "vps-c", "virt": "kvm" },
                "10": { "plid": "10", "plan_name": "vps-c", "virt": "kvm" }
            }
        }))
        .unwrap();
        let plids: Vec<_> = page.plans.iter().map(|p| p.plid.as_str()).collect();
        assert_eq!(plids, ["9", "10"]);
    }

    #[test]
    fn empty_php_array_is_an_empty_collection() {
        let page: PlansPage = serde_json::from_value(json!({ "plans": [] })).unwrap();
        assert!(page.plans.is_empty());
        let page: PlansPage = serde_json::from_value(json!({ "plans": false })).unwrap();
        assert!(page.plans.is_empty());
    }

    #[test]
    fn done_is_truthy_in_many_shapes() {
        for done in [json!(1), json!("57"), json!(true), json!({"change_pass_msg": "ok"})] {
            let r: ActionResult = serde_json::from_value(json!({ "done": done })).unwrap();
            assert!(r.is_done());
        }
        for done in [json!(0), json!(""), json!(null), json!([]), json!("0")] {
            let r: ActionResult = serde_json::from_value(json!({ "done": done })).unwrap();
            assert!(!r.is_done());
        }
    }
}
