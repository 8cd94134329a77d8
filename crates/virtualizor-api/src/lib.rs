//! Typed Rust client for the Virtualizor admin API.
//!
//! Every call is a form `POST` to `index.php?api=json&act=<action>` carrying the
//! admin key pair plus a per-request key hash. Covers the subset needed to run
//! the VPS lifecycle: create, inspect, power actions, suspension, rebuild,
//! plan change, root password, SSO/VNC, and the plan / server group / server /
//! OS template catalogs.

mod types;

use std::sync::Arc;

use md5::{Digest, Md5};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use vb_core::classify::{self, classify_outcome};
use vb_core::{ClassifiedError, HttpRequest, Method, Result, Transport, redact};

pub use types::*;

pub const DEFAULT_PORT: u16 = 4085;

/// Port of the end-user panel that SSO links point at.
const ENDUSER_PORT: u16 = 4083;

/// Client for one Virtualizor master panel.
#[derive(Clone)]
pub struct VirtualizorClient {
    transport: Arc<dyn Transport>,
    hostname: String,
    base_url: String,
    api_key: String,
    api_password: String,
}

impl VirtualizorClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        hostname: impl Into<String>,
        port: u16,
        api_key: impl Into<String>,
        api_password: impl Into<String>,
    ) -> Self {
        let hostname = hostname.into();
        Self {
            transport,
            base_url: format!("https://{hostname}:{port}"),
            hostname,
            api_key: api_key.into(),
            api_password: api_password.into(),
        }
    }

    /// Point the client somewhere other than `https://{hostname}:{port}`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// `<8 random chars><md5(api_password + random)>`
    fn api_key_hash(&self) -> String {
        let salt = random_string(8, LOWER_DIGITS);
        let digest = Md5::digest(format!("{}{salt}", self.api_password).as_bytes());
        format!("{salt}{digest:x}")
    }

    async fn call_raw(
        &self,
        act: &'static str,
        query: Vec<(&str, String)>,
        post: Vec<(&str, String)>,
    ) -> Result<Value> {
        let mut req = HttpRequest::new(Method::Post, format!("{}/index.php", self.base_url));
        for (key, value) in query {
            req = req.query(key, value);
        }
        req = req
            .query("api", "json")
            .query("act", act)
            .query("adminapikey", self.api_key.clone())
            .query("adminapipass", self.api_password.clone())
            .query("apikey", self.api_key_hash())
            .form(post.into_iter().map(|(k, v)| (k.to_string(), v)).collect());

        let resp = classify_outcome(act, self.transport.send(req).await)?;
        if resp.body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        resp.json().map_err(|e| classify::malformed_response(act, &resp, &e))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        act: &'static str,
        query: Vec<(&str, String)>,
        post: Vec<(&str, String)>,
    ) -> Result<T> {
        let data = self.call_raw(act, query, post).await?;
        decode(act, data)
    }

    /// Run a mutating action and insist the panel reports it done.
    async fn act(
        &self,
        act: &'static str,
        query: Vec<(&str, String)>,
        post: Vec<(&str, String)>,
        failure: &str,
        vpsid: &str,
    ) -> Result<ActionResult> {
        let data = self.call_raw(act, query, post).await?;
        let result: ActionResult = decode(act, data.clone())?;
        if !result.is_done() {
            return Err(unsuccessful(failure, act, vpsid, data));
        }
        Ok(result)
    }

    // ── Virtual servers ──────────────────────────────────────────────

    /// Returns the id of the new VPS.
    pub async fn create_vps(&self, req: &CreateVpsRequest) -> Result<String> {
        let post = vec![
            ("virt", req.virt.clone()),
            ("node_select", "1".to_string()),
            ("server_group", req.server_group.clone().unwrap_or_default()),
            ("slave_server", req.slave_server.clone().unwrap_or_default()),
            ("plid", req.plid.clone()),
            ("osid", req.osid.clone()),
            ("hostname", req.hostname.clone()),
            ("user_email", req.user_email.clone()),
            ("user_pass", req.root_password.clone()),
            ("rootpass", req.root_password.clone()),
            ("control_panel", "0".to_string()),
            ("addvps", "1".to_string()),
        ];

        let data = self.call_raw("addvs", vec![], post).await?;
        let result: ActionResult = decode("addvs", data.clone())?;
        let vpsid = result.vpsid.clone().or_else(|| match &result.done {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        match vpsid {
            Some(vpsid) if result.is_done() => Ok(vpsid),
            _ => Err(ClassifiedError::upstream("Virtual server creation unsuccessful")
                .with_data("plid", req.plid.as_str())
                .with_data("osid", req.osid.as_str())
                .with_data("hostname", req.hostname.as_str())
                .with_debug("response_data", redact::sanitize(data))),
        }
    }

    /// Everything known about a VPS (`editvs` without changes).
    pub async fn vps_details(&self, vpsid: &str) -> Result<VpsDetails> {
        let data = self
            .call_raw("editvs", vec![("vpsid", vpsid.to_string())], vec![])
            .await?;

        let present = data.get("vps").is_some_and(types::de::truthy);
        if !present {
            return Err(ClassifiedError::not_found("Virtual server not found")
                .with_data("vpsid", vpsid)
                .with_debug("response_data", redact::sanitize(data)));
        }

        decode("editvs", data)
    }

    /// `action` is one of `start`, `stop`, `restart`, `poweroff`.
    pub async fn vps_action(&self, vpsid: &str, action: &str) -> Result<ActionResult> {
        let query = vec![("vpsid", vpsid.to_string()), ("action", action.to_string())];
        self.act("vs", query, vec![], "Virtual server action unsuccessful", vpsid)
            .await
    }

    pub async fn change_root_password(&self, vpsid: &str, password: &str) -> Result<ActionResult> {
        let post = vec![
            ("rootpass", password.to_string()),
            ("enable_guest_agent", "1".to_string()),
            ("editvps", "1".to_string()),
        ];
        let data = self
            .call_raw("managevps", vec![("vpsid", vpsid.to_string())], post)
            .await?;

        // `done` is an object here; either of its keys signals success.
        let done = data.get("done");
        let changed = done
            .and_then(|d| d.get("change_pass_msg"))
            .is_some_and(types::de::truthy)
            || done.and_then(|d| d.get("done")).is_some_and(types::de::truthy);
        let pass_msg = done
            .and_then(|d| d.get("change_pass_msg"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        if !changed {
            return Err(unsuccessful(
                "Virtual server password change unsuccessful",
                "managevps",
                vpsid,
                data,
            ));
        }

        let mut result: ActionResult = decode("managevps", data)?;
        if result.done_msg.is_none() {
            result.done_msg = pass_msg;
        }
        Ok(result)
    }

    pub async fn change_plan(&self, vpsid: &str, plid: &str) -> Result<ActionResult> {
        let post = vec![("plid", plid.to_string()), ("editvps", "1".to_string())];
        self.act(
            "editvs",
            vec![("vpsid", vpsid.to_string())],
            post,
            "Virtual server plan change unsuccessful",
            vpsid,
        )
        .await
    }

    pub async fn rebuild(
        &self,
        vpsid: &str,
        osid: &str,
        serid: Option<&str>,
        password: &str,
    ) -> Result<ActionResult> {
        let query = serid
            .map(|s| vec![("changeserid", s.to_string())])
            .unwrap_or_default();
        let post = vec![
            ("vpsid", vpsid.to_string()),
            ("osid", osid.to_string()),
            ("newos", osid.to_string()),
            ("newpass", password.to_string()),
            ("conf", password.to_string()),
            ("control_panel", "0".to_string()),
            ("reos", "1".to_string()),
            ("format_primary", "0".to_string()),
            ("eu_send_rebuild_email", "0".to_string()),
        ];
        self.act("rebuild", query, post, "Virtual server rebuild unsuccessful", vpsid)
            .await
    }

    pub async fn suspend(&self, vpsid: &str) -> Result<ActionResult> {
        let query = vec![("suspend", vpsid.to_string())];
        self.act("vs", query, vec![], "Virtual server suspend unsuccessful", vpsid)
            .await
    }

    pub async fn unsuspend(&self, vpsid: &str) -> Result<ActionResult> {
        let query = vec![("unsuspend", vpsid.to_string())];
        self.act("vs", query, vec![], "Virtual server unsuspend unsuccessful", vpsid)
            .await
    }

    pub async fn delete(&self, vpsid: &str) -> Result<ActionResult> {
        let query = vec![("delete", vpsid.to_string())];
        self.act("vs", query, vec![], "Virtual server delete unsuccessful", vpsid)
            .await
    }

    // ── Access ───────────────────────────────────────────────────────

    /// One-time login URL into the end-user panel.
    pub async fn sso_url(&self, vpsid: &str) -> Result<String> {
        let data = self
            .call_raw("sso", vec![("svs", vpsid.to_string())], vec![])
            .await?;
        let token: SsoToken = decode("sso", data.clone())?;

        match (token.sid, token.token_key) {
            (Some(sid), Some(token_key)) => Ok(format!(
                "https://{}:{ENDUSER_PORT}/{token_key}/?as={sid}&svs={vpsid}",
                self.hostname
            )),
            _ => Err(ClassifiedError::upstream("Unable to obtain SSO url")
                .with_data("vpsid", vpsid)
                .with_debug("response_data", redact::sanitize(data))),
        }
    }

    pub async fn vnc_info(&self, vpsid: &str) -> Result<VncInfo> {
        let data = self
            .call_raw("vnc", vec![("novnc", vpsid.to_string())], vec![])
            .await?;

        match data.get("info") {
            Some(info) if types::de::truthy(info) => decode("vnc", info.clone()),
            _ => Err(ClassifiedError::upstream("Unable to obtain VNC details")
                .with_data("vpsid", vpsid)
                .with_debug("response_data", redact::sanitize(data))),
        }
    }

    // ── Catalogs ─────────────────────────────────────────────────────

    /// One page of plans. Pages are 1-based; an empty page marks the end.
    pub async fn plans(&self, page: u32, per_page: u32, filter: &PlanFilter) -> Result<Vec<Plan>> {
        let mut post = Vec::new();
        if let Some(name) = &filter.name {
            post.push(("planname", name.clone()));
        }
        if let Some(virt) = &filter.virt {
            post.push(("ptype", virt.clone()));
        }
        let page: PlansPage = self.call("plans", page_query(page, per_page), post).await?;
        Ok(page.plans)
    }

    pub async fn server_groups(
        &self,
        page: u32,
        per_page: u32,
        name: Option<&str>,
    ) -> Result<Vec<ServerGroup>> {
        let post = name
            .map(|n| vec![("sg_name", n.to_string())])
            .unwrap_or_default();
        let page: ServerGroupsPage = self
            .call("servergroups", page_query(page, per_page), post)
            .await?;
        Ok(page.servergroups)
    }

    pub async fn servers(
        &self,
        page: u32,
        per_page: u32,
        name: Option<&str>,
    ) -> Result<Vec<HostServer>> {
        let post = name
            .map(|n| vec![("servername", n.to_string())])
            .unwrap_or_default();
        let page: ServersPage = self.call("servers", page_query(page, per_page), post).await?;
        Ok(page.servs)
    }

    /// All OS templates. The panel keys them by id, so `osid` is filled from the key.
    pub async fn os_templates(&self) -> Result<Vec<OsTemplate>> {
        let data = self.call_raw("ostemplates", vec![], vec![]).await?;
        let Some(Value::Object(templates)) = data.get("ostemplates") else {
            return Ok(Vec::new());
        };

        templates
            .iter()
            .map(|(osid, template)| {
                let mut os: OsTemplate = decode("ostemplates", template.clone())?;
                if os.osid.is_empty() {
                    os.osid = osid.clone();
                }
                Ok(os)
            })
            .collect()
    }
}

fn page_query(page: u32, per_page: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("reslen", per_page.to_string())]
}

fn decode<T: DeserializeOwned>(act: &str, data: Value) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|e| {
        ClassifiedError::upstream("Unexpected provider API response")
            .with_data("endpoint", act)
            .with_debug("parse_error", e.to_string())
            .with_debug("response_data", redact::sanitize(data))
    })
}

fn unsuccessful(message: &str, act: &str, vpsid: &str, data: Value) -> ClassifiedError {
    ClassifiedError::upstream(message)
        .with_data("vpsid", vpsid)
        .with_data("endpoint", act)
        .with_debug("response_data", redact::sanitize(data))
}

// ── Passwords ────────────────────────────────────────────────────────

const LOWER_DIGITS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SPECIAL: &[u8] = b"!@#$%^&*-_=+";

fn random_string(len: usize, alphabet: &[u8]) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// A root password with at least one upper, lower, digit and special character.
pub fn generate_password(len: usize) -> String {
    let len = len.max(4);
    let mut rng = rand::rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();

    let mut chars: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL]
        .iter()
        .map(|set| set[rng.random_range(0..set.len())])
        .collect();
    chars.extend((chars.len()..len).map(|_| all[rng.random_range(0..all.len())]));

    // Fisher-Yates so the guaranteed classes are not always first.
    for i in (1..chars.len()).rev() {
        let j = rng.random_range(0..=i);
        chars.swap(i, j);
    }

    chars.into_iter().map(char::from).collect()
}
