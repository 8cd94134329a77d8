use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use twentyi_api::{
    AddVpsConfiguration, AddVpsOptions, AddVpsRequest, TwentyIClient, VPS_TYPES, Vps, VpsStatus,
};
use vb_core::{ClassifiedError, Result, Transport, TransportConfig};

use crate::config;
use crate::normalize::{or_unknown, parse_timestamp};
use crate::resolve::{self, CatalogEntry, IdOrName};
use crate::types::{
    ChangePasswordParams, ConnectionInfo, ConnectionParams, CreateParams, InstanceId,
    ReinstallParams, Reply, ServerInfo, ServerState,
};
use crate::{ConfigError, ProviderName, ServerProvider};

#[derive(Debug, Clone)]
pub struct TwentyIConfig {
    pub api_key: String,
}

impl TwentyIConfig {
    /// Load from env vars:
    ///
    /// - `TWENTYI_API_KEY` (required): the general API key
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: config::require("TWENTYI_API_KEY")?,
        })
    }
}

/// 20i reseller VPS. Sizes come from the static [`VPS_TYPES`] table.
pub struct TwentyIProvider {
    client: TwentyIClient,
}

impl TwentyIProvider {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let config = TwentyIConfig::from_env()?;
        let transport = config::transport(
            "twentyi",
            &TransportConfig {
                connect_timeout: Duration::from_secs(10),
                timeout: Duration::from_secs(60),
                verify_tls: true,
            },
        )?;
        Ok(Self::new(&config, transport))
    }

    pub fn new(config: &TwentyIConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_client(TwentyIClient::new(transport, &config.api_key))
    }

    pub fn with_client(client: TwentyIClient) -> Self {
        Self { client }
    }

    async fn server_info(&self, id: &InstanceId) -> Result<ServerInfo> {
        let vps = self.client.get_vps(id.as_str()).await?;
        Ok(vps_to_info(id, &vps))
    }
}

/// One row of [`VPS_TYPES`]: addressable by GB size or by type name.
struct SizeEntry {
    gb: &'static str,
    name: &'static str,
}

impl CatalogEntry for SizeEntry {
    fn entry_id(&self) -> String {
        self.gb.to_string()
    }

    fn entry_name(&self) -> &str {
        self.name
    }
}

fn vps_type(size: &str) -> Result<&'static str> {
    let sizes: Vec<SizeEntry> = VPS_TYPES
        .iter()
        .map(|&(gb, name)| SizeEntry { gb, name })
        .collect();
    let token = IdOrName::required("size", size)?;
    let found = resolve::find_in(&sizes, &token).map(|entry| entry.name);
    resolve::require(found, "Server size", &token, &[])
}

fn server_state(status: Option<&VpsStatus>) -> ServerState {
    let Some(status) = status else {
        return ServerState::Unknown;
    };
    if status.is_pending() {
        return ServerState::Pending;
    }
    match status.domstate.as_deref().map(str::trim) {
        Some("running") => ServerState::Running,
        Some("shut off" | "shutoff") => ServerState::Off,
        Some("in shutdown") => ServerState::Stopping,
        Some("paused") => ServerState::Suspended,
        Some("pending") => ServerState::Pending,
        _ => ServerState::Unknown,
    }
}

fn vps_to_info(id: &InstanceId, vps: &Vps) -> ServerInfo {
    let configuration = vps.configuration.clone().unwrap_or_default();
    let name = or_unknown(vps.name.as_deref());
    let memory_mb = configuration.ram_mb.unwrap_or(0);

    ServerInfo {
        instance_id: vps.id_string().map(InstanceId).unwrap_or_else(|| id.clone()),
        state: server_state(vps.status.as_ref()),
        suspended: false,
        label: name.clone(),
        hostname: name,
        ip_address: or_unknown(vps.primary_ip()),
        image: or_unknown(vps.os.as_ref().and_then(|os| os.display_name.as_deref())),
        size: VPS_TYPES
            .iter()
            .find(|(gb, _)| gb.parse::<u64>().ok().map(|gb| gb * 1024) == Some(memory_mb))
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| or_unknown(None)),
        location: or_unknown(configuration.location.as_deref()),
        node: None,
        virtualization_type: "kvm".into(),
        memory_mb,
        cpu_cores: configuration.cpu_cores.unwrap_or(0),
        disk_mb: configuration.os_disk_size_gb.unwrap_or(0) * 1024,
        created_at: parse_timestamp(vps.created_at.as_deref()),
        updated_at: parse_timestamp(vps.updated_at.as_deref()),
    }
}

#[async_trait]
impl ServerProvider for TwentyIProvider {
    fn name(&self) -> ProviderName {
        ProviderName::TwentyI
    }

    /// Orders the VPS, then reads it back. The read-back carries 20i's own
    /// status for the new order, so the snapshot reports that state as-is
    /// rather than forcing `Creating`.
    async fn create(&self, params: &CreateParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[
            ("size", params.size.as_str()),
            ("image", params.image.as_str()),
        ])?;

        let request = AddVpsRequest {
            configuration: AddVpsConfiguration {
                name: params.label.clone(),
            },
            for_user: None,
            options: AddVpsOptions {
                os: params.image.clone(),
            },
            period_months: 1,
            vps_type: vps_type(&params.size)?.to_string(),
        };
        let id = InstanceId(self.client.add_vps(&request).await?);

        info!(instance_id = %id, vps_type = %request.vps_type, "ordered 20i VPS");

        let info = self.server_info(&id).await?;
        Ok(Reply::new("Server created successfully!", info))
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

        let vps = self.client.get_vps(id.as_str()).await?;
        let ip = vps.primary_ip().filter(|ip| !ip.is_empty()).ok_or_else(|| {
            ClassifiedError::upstream("Server has no IP address yet").with_data("instance_id", id.as_str())
        })?;

        Ok(Reply::new(
            "SSH command generated",
            ConnectionInfo::Ssh {
                command: format!("ssh root@{ip}"),
                password: vps.super_password.clone(),
            },
        ))
    }

    async fn change_root_password(
        &self,
        id: &InstanceId,
        params: &ChangePasswordParams,
    ) -> Result<Reply<ServerInfo>> {
        self.client
            .change_password(id.as_str(), &params.root_password)
            .await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Root password has been updated", info))
    }

    async fn reinstall(&self, id: &InstanceId, params: &ReinstallParams) -> Result<Reply<ServerInfo>> {
        resolve::check_present(&[("image", params.image.as_str())])?;
        self.client.rebuild(id.as_str(), &params.image).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new(
            "Server rebuilding with fresh image/template",
            info.with_state(ServerState::Rebuilding),
        ))
    }

    async fn reboot(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        self.client.reboot(id.as_str()).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Server is rebooting", info.with_state(ServerState::Restarting)))
    }

    async fn power_on(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Running {
            return Ok(Reply::new("Virtual server already on", info));
        }

        self.client.start(id.as_str()).await?;
        Ok(Reply::new("Server is booting", info.with_state(ServerState::Starting)))
    }

    async fn shutdown(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        let info = self.server_info(id).await?;
        if info.state == ServerState::Off {
            return Ok(Reply::new("Virtual server already off", info));
        }

        self.client.stop(id.as_str()).await?;
        Ok(Reply::new("Server is shutting down", info.with_state(ServerState::Stopping)))
    }

    /// The user status is not readable back, so both directions always post.
    async fn suspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        self.client.set_user_status(id.as_str(), false).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Server suspended", info.with_suspended(true)))
    }

    async fn unsuspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
        self.client.set_user_status(id.as_str(), true).await?;
        let info = self.server_info(id).await?;
        Ok(Reply::new("Server unsuspended", info.with_suspended(false)))
    }
}
