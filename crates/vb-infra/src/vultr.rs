use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use vb_core::{ClassifiedError, Result, Transport, TransportConfig};
use vultr_api::{
    CreateInstanceRequest, Instance, OperatingSystem, Plan, PublicIso, Region,
    UpdateInstanceRequest, VultrClient,
};

use crate::cache::{CATALOG_TTL, CatalogCache};
use crate::config::{self, ResizePolicy};
use crate::normalize::{location_string, or_unknown, parse_timestamp};
use crate::resolve::{self, CatalogEntry, IdOrName};
use crate::types::{
    ConnectionInfo, ConnectionParams, CreateParams, InstanceId, IsoStatus, ReinstallParams, Reply,
    ResizeParams, ServerInfo, ServerState, UNKNOWN,
};
use crate::{ConfigError, ProviderName, ServerProvider};

/// Public ISO booted for recovery.
pub const RECOVERY_ISO_NAME: &str = "SystemRescue";

#[derive(Debug, Clone)]
pub struct VultrConfig {
    pub api_token: String,
    pub resize_policy: ResizePolicy,
}

impl VultrConfig {
    /// Load from env vars:
    ///
    /// - `VULTR_API_TOKEN` (required)
    /// - `VULTR_RESIZE_POLICY`: `require_stopped` | `allow_running` (default: `allow_running`)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_token: config::require("VULTR_API_TOKEN")?,
            resize_policy: config::parse_or("VULTR_RESIZE_POLICY", ResizePolicy::AllowRunning)?,
        })
    }
}

/// Vultr cloud compute. Instance ids are Vultr instance UUIDs.
pub struct VultrProvider {
    client: VultrClient,
    resize_policy: ResizePolicy,
    regions: CatalogCache<Region>,
    operating_systems: CatalogCache<OperatingSystem>,
    plans: CatalogCache<Plan>,
    public_isos: CatalogCache<PublicIso>,
}

impl VultrProvider {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let config = VultrConfig::from_env()?;
        let transport = config::transport(
            "vultr",
            &TransportConfig {
                connect_timeout: Duration::from_secs(10),
                timeout: Duration::from_secs(30),
                verify_tls: true,
            },
        )?;
        Ok(Self::new(&config, transport))
    }

    pub fn new(config: &VultrConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_client(config, VultrClient::new(transport, config.api_token.clone()))
    }

    pub fn with_client(config: &VultrConfig, client: VultrClient) -> Self {
        Self {
            client,
            resize_policy: config.resize_policy,
            regions: CatalogCache::new(),
            operating_systems: CatalogCache::new(),
            plans: CatalogCache::new(),
            public_isos: CatalogCache::new(),
        }
    }

    // ── Catalogs ─────────────────────────────────────────────────────

    async fn regions(&self) -> Result<Arc<Vec<Region>>> {
        self.regions
            .get_or_load("regions", CATALOG_TTL, || self.client.regions())
            .await
    }

    async fn resolve_region(&self, location: &str) -> Result<Region> {
        let token = IdOrName::required("location", location)?;
        let regions = self.regions().await?;
        let found = resolve::find_in(&regions, &token).cloned();
        resolve::require(found, "Region", &token, &[])
    }

    async fn resolve_os(&self, image: &str) -> Result<OperatingSystem> {
        let token = IdOrName::required("image", image)?;
        let all = self
            .operating_systems
            .get_or_load("os", CATALOG_TTL, || self.client.operating_systems())
            .await?;
        let found = resolve::find_in(&all, &token).cloned();
        resolve::require(found, "Operating system", &token, &[])
    }

    async fn resolve_plan(&self, size: &str) -> Result<Plan> {
        let token = IdOrName::required("size", size)?;
        let all = self
            .plans
            .get_or_load("plans", CATALOG_TTL, || self.client.plans())
            .await?;
        let found = resolve::find_in(&all, &token).cloned();
        resolve::require(found, "Plan", &token, &[])
    }

    async fn recovery_iso(&self) -> Result<PublicIso> {
        let isos = self
            .public_isos
            .get_or_load("iso-public", CATALOG_TTL, || self.client.public_isos())
            .await?;
        isos.iter()
            .find(|iso| iso.name == RECOVERY_ISO_NAME)
            .cloned()
            .ok_or_else(|| {
                ClassifiedError::not_found("A Recovery ISO was not found")
                    .with_data("name", RECOVERY_ISO_NAME)
            })
    }

    // ── Normalization ────────────────────────────────────────────────

    /// `"city, country"` of the region, or the bare region id when the
    /// catalog cannot be read.
    async fn location(&self, region_id: Option<&str>) -> String {
        let Some(region_id) = region_id.filter(|r| !r.is_empty()) else {
            return UNKNOWN.to_string();
        };

        match self.regions().await {
            Ok(regions) => regions
                .iter()
                .find(|region| region.id == region_id)
                .map(|region| location_string(region.city.as_deref(), None, region.country.as_deref()))
                .unwrap_or_else(|| region_id.to_string()),
            Err(e) => {
                warn!(region = region_id, error = %e, "region catalog unavailable");
                region_id.to_string()
            }
        }
    }

    async fn instance_to_info(&self, instance: &Instance) -> ServerInfo {
        let state = instance_state(instance);

        ServerInfo {
            instance_id: InstanceId(instance.id.clone()),
            state,
            suspended: state == ServerState::Suspended,
            label: or_unknown(instance.label.as_deref()),
            hostname: or_unknown(instance.hostname.as_deref()),
            ip_address: or_unknown(instance.main_ip.as_deref()),
            image: or_unknown(instance.os.as_deref()),
            size: or_unknown(instance.plan.as_deref()),
            location: self.location(instance.region.as_deref()).await,
            node: None,
            virtualization_type: "kvm".into(),
            memory_mb: instance.ram.unwrap_or(0),
            cpu_cores: instance.vcpu_count.unwrap_or(0),
            disk_mb: instance.disk.unwrap_or(0) * 1024,
            created_at: parse_timestamp(instance.date_created.as_deref()),
            updated_at: None,
        }
    }

    async fn server_info(&self, id: &InstanceId) -> Result<ServerInfo> {
        let instance = self.client.get_instance(id.as_str()).await?;
        Ok(self.instance_to_info(&instance).await)
    }
}

impl CatalogEntry for Region {
    fn entry_id(&self) -> String {
        self.id.clone()
    }

    fn entry_name(&self) -> &str {
        self.city.as_deref().unwrap_or_default()
    }

    /// Region ids (`ewr`, `lhr`) are not numeric, so they arrive as names.
    fn matches_name(&self, name: &str) -> bool {
        self.id == name || self.entry_name() == name
    }
}

impl CatalogEntry for OperatingSystem {
    fn entry_id(&self) -> String {
        self.id.to_string()
    }

    fn entry_name(&self) -> &str {
        &self.name
    }
}

impl CatalogEntry for Plan {
    fn entry_id(&self) -> String {
        self.id.clone()
    }

    /// Plans have no display name; the id (`vc2-1c-1gb`) is the name.
    fn entry_name(&self) -> &str {
        &self.id
    }
}

fn instance_state(instance: &Instance) -> ServerState {
    let power = instance.power_status.as_deref();
    let server = instance.server_status.as_deref();

    match instance.status.as_deref() {
        Some("pending") | Some("resizing") => ServerState::Pending,
        Some("suspended") => ServerState::Suspended,
        Some("active") => match (power, server) {
            (Some("stopped"), _) => ServerState::Off,
            (Some("running"), Some("installingbooting")) => ServerState::Starting,
            (Some("running"), Some("locked")) => ServerState::Rebuilding,
            (Some("running"), _) => ServerState::Running,
            _ => ServerState::Unknown,
        },
        _ => ServerState::Unknown,
    }
}

fn iso_status(status: &vultr_api::IsoStatus) -> IsoStatus {
    IsoStatus {
        iso_id: status.mounted_iso().map(str::to_string),
        state: or_unknown(status.state.as_deref()),
    }
}

#[async_trait]
impl ServerProvider for VultrProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Vultr
    }

    async fn create(&self, params: &CreateParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[
            ("size", params.size.as_str()),
            ("image", params.image.as_str()),
            ("location", params.location.as_str()),
        ])?;
        let region = self.resolve_region(&params.location).await?;
        let os = self.resolve_os(&params.image).await?;
        let plan = self.resolve_plan(&params.size).await?;

        let request = CreateInstanceRequest {
            region: region.id.clone(),
            plan: plan.id.clone(),
            os_id: os.id,
            label: params.label.clone(),
            hostname: params.label.clone(),
        };
        let instance = self.client.create_instance(&request).await?;

        info!(instance_id = %instance.id, region = %region.id, plan = %plan.id, "created Vultr instance");

        let info = self.instance_to_info(&instance).await;
        Ok(Reply::new("Instance created", info))
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
        if let Some(application) = &params.application {
            return Err(ClassifiedError::unsupported("get_connection")
                .with_data("application", application.as_str()));
        }

        let instance = self.client.get_instance(id.as_str()).await?;
        let ip = instance
            .main_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != "0.0.0.0")
            .ok_or_else(|| {
                ClassifiedError::upstream("Instance has no IP address yet")
                    .with_data("instance_id", id.as_str())
            })?;

        Ok(Reply::new(
            "SSH command generated",
            ConnectionInfo::Ssh {
                command: format!("ssh root@{ip}"),
                password: None,
            },
        ))
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

        let plan = self.resolve_plan(&params.size).await?;
        let upgrades = self.client.upgrade_plans(id.as_str()).await?;
        if !upgrades.iter().any(|p| *p == plan.id) {
            return Err(ClassifiedError::validation("Plan is not an available upgrade for this instance")
                .with_data("instance_id", id.as_str())
                .with_data("plan", plan.id.as_str()));
        }

        let update = UpdateInstanceRequest {
            plan: Some(plan.id.clone()),
            ..Default::default()
        };
        let instance = self.client.update_instance(id.as_str(), &update).await?;

        info!(instance_id = %id, plan = %plan.id, "upgraded Vultr instance plan");

        let info = self.instance_to_info(&instance).await;
        Ok(Reply::new("Instance plan upgraded", info))
    }

    /// Same OS: the reinstall endpoint. Different OS: an `os_id` update,
    /// which Vultr performs as a reinstall.
    async fn reinstall(&self, id: &InstanceId, params: &ReinstallParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[("image", params.image.as_str())])?;
        let current = self.client.get_instance(id.as_str()).await?;
        let os = self.resolve_os(&params.image).await?;

        let instance = if current.os_id == Some(os.id) {
            self.client.reinstall_instance(id.as_str()).await?
        } else {
            let update = UpdateInstanceRequest {
                os_id: Some(os.id),
                ..Default::default()
            };
            self.client.update_instance(id.as_str(), &update).await?
        };

        info!(instance_id = %id, os = %os.name, "reinstalling Vultr instance");

        let info = self.instance_to_info(&instance).await;
        Ok(Reply::new(
            "Instance reinstalling",
            ServerInfo {
                image: os.name,
                ..info.with_state(ServerState::Rebuilding)
            },
        ))
    }

    async fn reboot(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        self.client.reboot_instance(id.as_str()).await?;
        Ok(Reply::new("Instance rebooting", info.with_state(ServerState::Restarting)))
    }

    async fn power_on(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Running {
            return Ok(Reply::new("Virtual server already on", info));
        }

        self.client.start_instance(id.as_str()).await?;
        Ok(Reply::new("Instance starting", info.with_state(ServerState::Starting)))
    }

    async fn shutdown(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Off {
            return Ok(Reply::new("Virtual server already off", info));
        }

        self.client.halt_instance(id.as_str()).await?;
        Ok(Reply::new("Instance stopping", info.with_state(ServerState::Stopping)))
    }

    async fn suspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        self.client.halt_instance(id.as_str()).await?;
        Ok(Reply::new(
            "Instance halted",
            info.with_state(ServerState::Stopping).with_suspended(true),
        ))
    }

    async fn unsuspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        self.client.start_instance(id.as_str()).await?;
        Ok(Reply::new(
            "Instance started",
            info.with_state(ServerState::Starting).with_suspended(false),
        ))
    }

    async fn attach_recovery_iso(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let iso = self.recovery_iso().await?;
        let status = self.client.attach_iso(id.as_str(), &iso.id).await?;

        if status.state.as_deref() != Some("ready") {
            if status.state.as_deref() != Some("isomounting") || status.mounted_iso().is_none() {
                return Err(ClassifiedError::upstream("Unable to attach recovery ISO")
                    .with_data("instance_id", id.as_str())
                    .with_debug("iso_state", status.state.clone()));
            }

            let current = self.client.iso_status(id.as_str()).await?;
            if current.mounted_iso() != Some(iso.id.as_str()) {
                return Err(ClassifiedError::upstream("Unable to attach recovery ISO (iso mismatch)")
                    .with_data("instance_id", id.as_str())
                    .with_data("iso_id", iso.id.as_str())
                    .with_debug("mounted_iso", current.iso_id.clone()));
            }
        }

        info!(instance_id = %id, iso_id = %iso.id, "attached recovery ISO");

        let info = self.server_info(id).await?;
        Ok(Reply::new("Recovery ISO attached", info))
    }

    async fn detach_recovery_iso(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let iso = self.recovery_iso().await?;
        let current = self.client.iso_status(id.as_str()).await?;

        match current.mounted_iso() {
            None => {
                let info = self.server_info(id).await?;
                return Ok(Reply::new("No ISO attached", info));
            }
            Some(mounted) if mounted != iso.id => {
                return Err(ClassifiedError::conflict("A different ISO is attached to this instance")
                    .with_data("instance_id", id.as_str())
                    .with_data("iso_id", mounted));
            }
            Some(_) => {}
        }

        self.client.detach_iso(id.as_str()).await?;

        info!(instance_id = %id, iso_id = %iso.id, "detached recovery ISO");

        let info = self.server_info(id).await?;
        Ok(Reply::new("Recovery ISO detached", info))
    }

    async fn recovery_iso_status(&self, id: &InstanceId) -> Result<Reply<IsoStatus>> {
        let status = self.client.iso_status(id.as_str()).await?;
        Ok(Reply::new("ISO status obtained", iso_status(&status)))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<Reply<()>> {
        self.client.delete_instance(id.as_str()).await?;
        info!(instance_id = %id, "deleted Vultr instance");
        Ok(Reply::new("Instance deleted", ()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn instance(status: &str, power: &str, server: &str) -> Instance {
        serde_json::from_value(json!({
            "id": "cb676a46-66fd-4dfb-b839-443f2e6c0b60",
            "status": status,
            "power_status": power,
            "server_status": server,
        }))
        .unwrap()
    }

    #[test]
    fn state_mapping() {
        for (status, power, server, expected) in [
            ("pending", "stopped", "none", ServerState::Pending),
            ("resizing", "running", "ok", ServerState::Pending),
            ("suspended", "stopped", "ok", ServerState::Suspended),
            ("active", "stopped", "ok", ServerState::Off),
            ("active", "running", "installingbooting", ServerState::Starting),
            ("active", "running", "locked", ServerState::Rebuilding),
            ("active", "running", "ok", ServerState::Running),
            ("active", "rebooting", "ok", ServerState::Unknown),
            ("closed", "stopped", "none", ServerState::Unknown),
        ] {
            assert_eq!(
                instance_state(&instance(status, power, server)),
                expected,
                "{status}/{power}/{server}"
            );
        }
    }

    #[test]
    fn regions_match_by_code_or_city() {
        let region: Region = serde_json::from_value(json!({
            "id": "lhr", "city": "London", "country": "GB", "continent": "Europe"
        }))
        .unwrap();

        assert!(region.matches(&IdOrName::parse("lhr")));
        assert!(region.matches(&IdOrName::parse("London")));
        assert!(!region.matches(&IdOrName::parse("london")));
    }

    #[test]
    fn nothing_mounted_reports_no_iso() {
        let status: vultr_api::IsoStatus =
            serde_json::from_value(json!({ "state": "ready", "iso_id": "" })).unwrap();
        assert_eq!(
            iso_status(&status),
            IsoStatus {
                iso_id: None,
                state: "ready".into()
            }
        );
    }
}
