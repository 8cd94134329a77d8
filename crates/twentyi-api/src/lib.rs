//! Typed Rust client for the 20i reseller REST API.
//!
//! Covers the VPS subset: lookup, ordering, power actions, rebuild, password
//! change and the per-user enable/disable switch used for suspension.

mod types;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use vb_core::classify::{self, classify_outcome};
use vb_core::{ClassifiedError, HttpRequest, HttpResponse, Method, Result, Transport};

pub use types::*;

const BASE_URL: &str = "https://api.20i.com";

/// Client for the 20i reseller API.
#[derive(Clone)]
pub struct TwentyIClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    bearer: String,
}

impl TwentyIClient {
    /// `api_key` is the general API key; the bearer token is its base64 form.
    pub fn new(transport: Arc<dyn Transport>, api_key: &str) -> Self {
        Self {
            transport,
            base_url: BASE_URL.to_string(),
            bearer: STANDARD.encode(api_key),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<HttpResponse> {
        let mut req = HttpRequest::new(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.bearer))
            .header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        classify_outcome(path, self.transport.send(req).await)
    }

    fn parse<T: DeserializeOwned>(path: &str, resp: &HttpResponse) -> Result<T> {
        resp.json().map_err(|e| classify::malformed_response(path, resp, &e))
    }

    async fn post(&self, path: &str, body: Value) -> Result<()> {
        self.send(Method::Post, path, Some(body)).await?;
        Ok(())
    }

    // ── VPS ──────────────────────────────────────────────────────────

    pub async fn get_vps(&self, id: &str) -> Result<Vps> {
        let path = format!("/vps/{id}");
        let resp = self.send(Method::Get, &path, None).await?;
        Self::parse(&path, &resp)
    }

    /// Orders a VPS and returns its id.
    pub async fn add_vps(&self, req: &AddVpsRequest) -> Result<String> {
        let path = "/reseller/*/addVPS";
        let body = serde_json::to_value(req)
            .map_err(|e| ClassifiedError::validation(format!("invalid VPS order: {e}")))?;
        let resp = self.send(Method::Post, path, Some(body)).await?;
        let created: AddVpsResponse = Self::parse(path, &resp)?;

        match created.result {
            Value::String(id) if !id.is_empty() => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(ClassifiedError::upstream("VPS ordered but no id was returned")
                .with_data("endpoint", path)
                .with_data("name", req.configuration.name.as_str())
                .with_debug("result", other)),
        }
    }

    pub async fn change_password(&self, id: &str, password: &str) -> Result<()> {
        self.post(&format!("/vps/{id}/changePassword"), json!({ "password": password }))
            .await
    }

    /// Enables or disables the VPS for its end user.
    pub async fn set_user_status(&self, id: &str, enabled: bool) -> Result<()> {
        let body = json!({
            "includeRepeated": true,
            "subservices": { "default": enabled },
        });
        self.post(&format!("/vps/{id}/userStatus"), body).await
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        self.post(&format!("/vps/{id}/start"), json!({})).await
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.post(&format!("/vps/{id}/stop"), json!({})).await
    }

    pub async fn reboot(&self, id: &str) -> Result<()> {
        self.post(&format!("/vps/{id}/reboot"), json!({})).await
    }

    pub async fn rebuild(&self, id: &str, os_id: &str) -> Result<()> {
        let body = json!({
            "cpanel": false,
            "cpanelCode": false,
            "VpsOsId": os_id,
        });
        self.post(&format!("/vps/{id}/rebuild"), body).await
    }
}
