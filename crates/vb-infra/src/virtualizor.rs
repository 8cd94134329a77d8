use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use vb_core::{ClassifiedError, Result, Transport, TransportConfig};
use virtualizor_api::{
    CreateVpsRequest, HostServer, OsTemplate, Plan, PlanFilter, ServerGroup, VirtualizorClient,
    VpsDetails, generate_password,
};

use crate::cache::{CATALOG_TTL, CatalogCache};
use crate::config::{self, ResizePolicy};
use crate::normalize::{location_from_json, or_unknown};
use crate::resolve::{self, CatalogEntry, IdOrName, PAGE_SIZE};
use crate::types::{
    ChangePasswordParams, ConnectionInfo, ConnectionParams, CreateParams, InstanceId,
    ReinstallParams, Reply, ResizeParams, ServerInfo, ServerState,
};
use crate::{ConfigError, ProviderName, ServerProvider};

const GENERATED_PASSWORD_LEN: usize = 16;

/// What the `location` of a create request names on this panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    ServerGroup,
    Server,
    /// Matched against each host server's rendered location string.
    Location,
}

impl FromStr for LocationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "server_group" => Ok(Self::ServerGroup),
            "server" => Ok(Self::Server),
            "location" => Ok(Self::Location),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualizorConfig {
    pub hostname: String,
    pub port: u16,
    pub api_key: String,
    pub api_password: String,
    pub ignore_ssl_errors: bool,
    pub location_type: LocationType,
    pub default_virtualization_type: String,
    pub resize_policy: ResizePolicy,
}

impl VirtualizorConfig {
    pub fn new(
        hostname: impl Into<String>,
        api_key: impl Into<String>,
        api_password: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port: virtualizor_api::DEFAULT_PORT,
            api_key: api_key.into(),
            api_password: api_password.into(),
            ignore_ssl_errors: true,
            location_type: LocationType::ServerGroup,
            default_virtualization_type: "kvm".into(),
            resize_policy: ResizePolicy::RequireStopped,
        }
    }

    /// Load from env vars:
    ///
    /// - `VIRTUALIZOR_HOSTNAME`, `VIRTUALIZOR_API_KEY`, `VIRTUALIZOR_API_PASSWORD` (required)
    /// - `VIRTUALIZOR_PORT` (default: `4085`)
    /// - `VIRTUALIZOR_IGNORE_SSL_ERRORS` (default: `true`)
    /// - `VIRTUALIZOR_LOCATION_TYPE`: `server_group` | `server` | `location` (default: `server_group`)
    /// - `VIRTUALIZOR_DEFAULT_VIRT` (default: `kvm`)
    /// - `VIRTUALIZOR_RESIZE_POLICY`: `require_stopped` | `allow_running` (default: `require_stopped`)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::new(
            config::require("VIRTUALIZOR_HOSTNAME")?,
            config::require("VIRTUALIZOR_API_KEY")?,
            config::require("VIRTUALIZOR_API_PASSWORD")?,
        );

        Ok(Self {
            port: config::parse_or("VIRTUALIZOR_PORT", defaults.port)?,
            ignore_ssl_errors: config::flag("VIRTUALIZOR_IGNORE_SSL_ERRORS", true)?,
            location_type: config::parse_or("VIRTUALIZOR_LOCATION_TYPE", defaults.location_type)?,
            default_virtualization_type: config::parse_or(
                "VIRTUALIZOR_DEFAULT_VIRT",
                defaults.default_virtualization_type.clone(),
            )?,
            resize_policy: config::parse_or("VIRTUALIZOR_RESIZE_POLICY", defaults.resize_policy)?,
            ..defaults
        })
    }
}

/// Virtualizor master panel. Instance ids are VPS ids (`vpsid`).
pub struct VirtualizorProvider {
    client: VirtualizorClient,
    location_type: LocationType,
    default_virtualization_type: String,
    resize_policy: ResizePolicy,
    os_templates: CatalogCache<OsTemplate>,
}

impl VirtualizorProvider {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let config = VirtualizorConfig::from_env()?;
        let transport = config::transport(
            "virtualizor",
            &TransportConfig {
                connect_timeout: Duration::from_secs(10),
                timeout: Duration::from_secs(60),
                verify_tls: !config.ignore_ssl_errors,
            },
        )?;
        Ok(Self::new(&config, transport))
    }

    pub fn new(config: &VirtualizorConfig, transport: Arc<dyn Transport>) -> Self {
        let client = VirtualizorClient::new(
            transport,
            config.hostname.clone(),
            config.port,
            config.api_key.clone(),
            config.api_password.clone(),
        );
        Self::with_client(config, client)
    }

    pub fn with_client(config: &VirtualizorConfig, client: VirtualizorClient) -> Self {
        Self {
            client,
            location_type: config.location_type,
            default_virtualization_type: config.default_virtualization_type.clone(),
            resize_policy: config.resize_policy,
            os_templates: CatalogCache::new(),
        }
    }

    // ── Resolution ───────────────────────────────────────────────────

    async fn find_plan(&self, token: &IdOrName, virt: Option<&str>) -> Result<Option<Plan>> {
        let filter = PlanFilter {
            name: token.name().map(str::to_string),
            virt: virt.map(str::to_string),
        };
        let (client, filter) = (&self.client, &filter);
        resolve::scan_pages(
            move |page| client.plans(page, PAGE_SIZE, filter),
            |plan: &Plan| plan.matches(token),
        )
        .await
    }

    async fn resolve_plan(&self, size: &str, virt: Option<&str>) -> Result<Plan> {
        let token = IdOrName::required("size", size)?;
        let what = match virt {
            Some(virt) => format!("{} plan", resolve::capitalize(virt)),
            None => "Plan".to_string(),
        };
        let found = self.find_plan(&token, virt).await?;
        resolve::require(found, &what, &token, &[("virt", virt)])
    }

    async fn resolve_os_template(&self, image: &str) -> Result<OsTemplate> {
        let token = IdOrName::required("image", image)?;
        let templates = self
            .os_templates
            .get_or_load("ostemplates", CATALOG_TTL, || self.client.os_templates())
            .await?;
        let found = resolve::find_in(&templates, &token).cloned();
        resolve::require(found, "OS template", &token, &[])
    }

    async fn resolve_server_group(&self, location: &str) -> Result<ServerGroup> {
        let token = IdOrName::required("location", location)?;
        let (client, name) = (&self.client, token.name());
        let found = resolve::scan_pages(
            move |page| client.server_groups(page, PAGE_SIZE, name),
            |group: &ServerGroup| group.matches(&token),
        )
        .await?;
        resolve::require(found, "Server group", &token, &[])
    }

    async fn resolve_server(&self, location: &str) -> Result<HostServer> {
        let token = IdOrName::required("location", location)?;
        let (client, name) = (&self.client, token.name());
        let found = resolve::scan_pages(
            move |page| client.servers(page, PAGE_SIZE, name),
            |server: &HostServer| server.matches(&token),
        )
        .await?;
        resolve::require(found, "Host server", &token, &[])
    }

    /// A host server whose rendered location equals `location`.
    async fn resolve_server_by_location(&self, location: &str) -> Result<HostServer> {
        resolve::check_present(&[("location", location)])?;
        let client = &self.client;
        let found = resolve::scan_pages(
            move |page| client.servers(page, PAGE_SIZE, None),
            |server: &HostServer| location_from_json(server.location.as_deref()) == location,
        )
        .await?;
        found.ok_or_else(|| {
            ClassifiedError::not_found("Host server not found").with_data("location", location)
        })
    }

    // ── Normalization ────────────────────────────────────────────────

    async fn server_info(&self, id: &InstanceId) -> Result<ServerInfo> {
        let details = self.client.vps_details(id.as_str()).await?;
        self.details_to_info(&details).await
    }

    /// `editvs` normally embeds the plan and host server; fall back to the
    /// catalogs when it does not.
    async fn details_to_info(&self, details: &VpsDetails) -> Result<ServerInfo> {
        let vps = &details.vps;

        let plan = match details.plan() {
            Some(plan) => Some(plan.clone()),
            None if vps.plid.is_empty() => None,
            None => self.find_plan(&IdOrName::Id(vps.plid.clone()), None).await?,
        };
        let server = match details.server() {
            Some(server) => server.clone(),
            None => self.resolve_server(&vps.serid).await?,
        };

        let location = match self.location_type {
            LocationType::Server => or_unknown(Some(server.server_name.as_str())),
            _ => location_from_json(server.location.as_deref()),
        };
        let hostname = or_unknown(vps.hostname.as_deref());

        Ok(ServerInfo {
            instance_id: InstanceId(vps.vpsid.clone()),
            state: server_state(vps.stats.as_ref().and_then(|s| s.status)),
            suspended: vps.suspended,
            label: format!("{hostname} [{}]", vps.vps_name),
            hostname,
            ip_address: or_unknown(vps.ips.first().map(String::as_str)),
            image: or_unknown(vps.os_name.as_deref()),
            size: plan
                .map(|p| p.plan_name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Custom".into()),
            location,
            node: Some(server.server_name.clone()).filter(|n| !n.is_empty()),
            virtualization_type: or_unknown(vps.virt.as_deref()),
            memory_mb: vps.ram,
            cpu_cores: vps.cores,
            disk_mb: vps.space * 1024,
            created_at: None,
            updated_at: None,
        })
    }

    async fn sso_redirect(&self, id: &InstanceId) -> Result<Reply<ConnectionInfo>> {
        let url = self.client.sso_url(id.as_str()).await?;
        Ok(Reply::new("Control panel URL generated", ConnectionInfo::Redirect { url }))
    }
}

impl CatalogEntry for Plan {
    fn entry_id(&self) -> String {
        self.plid.clone()
    }

    fn entry_name(&self) -> &str {
        &self.plan_name
    }
}

impl CatalogEntry for ServerGroup {
    fn entry_id(&self) -> String {
        self.sgid.clone()
    }

    fn entry_name(&self) -> &str {
        &self.sg_name
    }
}

impl CatalogEntry for HostServer {
    fn entry_id(&self) -> String {
        self.serid.clone()
    }

    fn entry_name(&self) -> &str {
        &self.server_name
    }
}

impl CatalogEntry for OsTemplate {
    fn entry_id(&self) -> String {
        self.osid.clone()
    }

    fn entry_name(&self) -> &str {
        &self.name
    }
}

/// `stats.status`: 0 off, 1 on, 2 suspended.
fn server_state(status: Option<u64>) -> ServerState {
    match status {
        Some(0) => ServerState::Off,
        Some(1) => ServerState::Running,
        Some(2) => ServerState::Suspended,
        _ => ServerState::Unknown,
    }
}

#[async_trait]
impl ServerProvider for VirtualizorProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Virtualizor
    }

    async fn create(&self, params: &CreateParams) -> Result<Reply<ServerInfo>> {
        let email = params
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                ClassifiedError::validation("An email address is required").with_data("field", "email")
            })?;
        resolve::check_present(&[
            ("size", params.size.as_str()),
            ("image", params.image.as_str()),
            ("location", params.location.as_str()),
        ])?;

        let virt = params
            .virtualization_type
            .clone()
            .unwrap_or_else(|| self.default_virtualization_type.clone());

        let plan = self.resolve_plan(&params.size, Some(&virt)).await?;
        let template = self.resolve_os_template(&params.image).await?;

        let (server_group, slave_server) = match self.location_type {
            LocationType::ServerGroup => {
                let group = self.resolve_server_group(&params.location).await?;
                (Some(group.sgid), None)
            }
            LocationType::Server => {
                let server = self.resolve_server(&params.location).await?;
                (None, Some(server.serid))
            }
            LocationType::Location => {
                let server = self.resolve_server_by_location(&params.location).await?;
                (None, Some(server.serid))
            }
        };

        let request = CreateVpsRequest {
            virt: if plan.virt.is_empty() { virt } else { plan.virt.clone() },
            plid: plan.plid.clone(),
            osid: template.osid.clone(),
            server_group,
            slave_server,
            hostname: params.label.clone(),
            user_email: email.to_string(),
            root_password: params
                .root_password
                .clone()
                .unwrap_or_else(|| generate_password(GENERATED_PASSWORD_LEN)),
        };
        let vpsid = self.client.create_vps(&request).await?;

        info!(instance_id = %vpsid, plan = %plan.plan_name, "created Virtualizor VPS");

        let info = self.server_info(&InstanceId(vpsid)).await?;
        Ok(Reply::new(
            "Virtual server creating",
            info.with_state(ServerState::Creating),
        ))
    }

    async fn get_info(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        Ok(Reply::new("Server info obtained", info))
    }

    async fn get_connection(
        &self,
        id: &InstanceId,
        params: &ConnectionParams,
    ) -> Result<Reply<ConnectionInfo>> {
        let Some(application) = params.application.as_deref() else {
            return self.sso_redirect(id).await;
        };

        match application {
            "whm" | "cpanel" => {
                let info = self.server_info(id).await?;
                let port = if application == "whm" { 2087 } else { 2083 };
                let field = |key: &str| params.application_params.get(key).cloned().unwrap_or_default();
                let form = BTreeMap::from([
                    ("user".to_string(), field("username")),
                    ("pass".to_string(), field("password")),
                ]);
                Ok(Reply::new(
                    "Control panel URL generated",
                    ConnectionInfo::FormPost {
                        url: format!("https://{}:{port}/login/", info.hostname),
                        params: form,
                    },
                ))
            }
            "vnc" => {
                let vnc = self.client.vnc_info(id.as_str()).await?;
                let host = vnc
                    .ip
                    .unwrap_or_else(|| self.client.hostname().to_string());
                let port = vnc
                    .port
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| {
                        ClassifiedError::upstream("VNC port unavailable")
                            .with_data("vpsid", id.as_str())
                    })?;
                Ok(Reply::new(
                    "VNC connection details obtained",
                    ConnectionInfo::Vnc {
                        host,
                        port,
                        password: vnc.password,
                    },
                ))
            }
            other => Err(ClassifiedError::unsupported("get_connection")
                .with_data("application", other)),
        }
    }

    async fn change_root_password(
        &self,
        id: &InstanceId,
        params: &ChangePasswordParams,
    ) -> Result<Reply<ServerInfo>> {
        let result = self
            .client
            .change_root_password(id.as_str(), &params.root_password)
            .await?;
        let info = self.server_info(id).await?;
        let message = result.done_msg.unwrap_or_else(|| "Root password changed".into());
        Ok(Reply::new(message, info))
    }

    async fn resize(&self, id: &InstanceId, params: &ResizeParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[("size", params.size.as_str())])?;
        let info = self.server_info(id).await?;

        if self.resize_policy == ResizePolicy::RequireStopped
            && info.state == ServerState::Running
            && !params.resize_running
        {
            return Err(ClassifiedError::conflict("Resize not available while server is running")
                .with_data("instance_id", id.as_str())
                .with_data("state", info.state.as_str()));
        }

        let plan = self
            .resolve_plan(&params.size, Some(&info.virtualization_type))
            .await?;
        let result = self.client.change_plan(id.as_str(), &plan.plid).await?;

        info!(instance_id = %id, plan = %plan.plan_name, "resized Virtualizor VPS");

        let message = result.done_msg.unwrap_or_else(|| "Virtual server plan updated".into());
        Ok(Reply::new(
            message,
            ServerInfo {
                size: plan.plan_name,
                ..info
            },
        ))
    }

    async fn reinstall(&self, id: &InstanceId, params: &ReinstallParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[("image", params.image.as_str())])?;
        let details = self.client.vps_details(id.as_str()).await?;
        let info = self.details_to_info(&details).await?;
        let template = self.resolve_os_template(&params.image).await?;

        let serid = Some(details.vps.serid.as_str()).filter(|s| !s.is_empty());
        let password = generate_password(GENERATED_PASSWORD_LEN);
        let result = self
            .client
            .rebuild(id.as_str(), &template.osid, serid, &password)
            .await?;

        info!(instance_id = %id, image = %template.name, "rebuilding Virtualizor VPS");

        let message = result.done_msg.unwrap_or_else(|| "Virtual server reinstalling".into());
        Ok(Reply::new(
            message,
            ServerInfo {
                image: template.name,
                state: ServerState::Rebuilding,
                ..info
            },
        ))
    }

    async fn reboot(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        let result = self.client.vps_action(id.as_str(), "restart").await?;
        let message = result.done_msg.unwrap_or_else(|| "Virtual server restarting".into());
        Ok(Reply::new(message, info.with_state(ServerState::Restarting)))
    }

    async fn power_on(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Running {
            return Ok(Reply::new("Virtual server already on", info));
        }

        let result = self.client.vps_action(id.as_str(), "start").await?;
        let message = result.done_msg.unwrap_or_else(|| "Virtual server starting".into());
        Ok(Reply::new(message, info.with_state(ServerState::Starting)))
    }

    async fn shutdown(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Off {
            return Ok(Reply::new("Virtual server already off", info));
        }

        let result = self.client.vps_action(id.as_str(), "stop").await?;
        let message = result.done_msg.unwrap_or_else(|| "Virtual server stopping".into());
        Ok(Reply::new(message, info.with_state(ServerState::Stopping)))
    }

    async fn suspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        self.client.suspend(id.as_str()).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Virtual server suspended", info.with_suspended(true)))
    }

    async fn unsuspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        self.client.unsuspend(id.as_str()).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Virtual server unsuspended", info.with_suspended(false)))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<Reply<()>> {
        self.client.delete(id.as_str()).await?;
        info!(instance_id = %id, "deleted Virtualizor VPS");
        Ok(Reply::new("Virtual server deleted", ()))
    }
}
