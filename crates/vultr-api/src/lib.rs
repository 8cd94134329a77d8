//! Typed Rust client for the Vultr v2 API.
//!
//! Covers instances (create, get, update, delete, power actions, reinstall,
//! plan upgrades, ISO mounting) and the region / OS / plan / public ISO
//! catalogs.

mod types;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use vb_core::classify::{self, classify_outcome};
use vb_core::{ClassifiedError, HttpRequest, HttpResponse, Method, Result, Transport, redact};

pub use types::*;

const BASE_URL: &str = "https://api.vultr.com/v2";

const PER_PAGE: u32 = 100;

/// Cursor pages followed before a listing is considered runaway.
const MAX_PAGES: usize = 50;

/// Client for the Vultr v2 REST API.
#[derive(Clone)]
pub struct VultrClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
}

impl VultrClient {
    pub fn new(transport: Arc<dyn Transport>, token: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: BASE_URL.to_string(),
            token: token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, endpoint: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}/{endpoint}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
    }

    async fn send(&self, endpoint: &str, req: HttpRequest) -> Result<HttpResponse> {
        classify_outcome(endpoint, self.transport.send(req).await)
    }

    /// A call that must answer `204 No Content`.
    async fn no_content(&self, endpoint: &str, req: HttpRequest, failure: &str) -> Result<()> {
        let resp = self.send(endpoint, req).await?;
        if resp.status != 204 {
            return Err(unexpected(failure, endpoint, &resp));
        }
        Ok(())
    }

    /// A call that must answer a non-empty JSON document.
    async fn document<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        req: HttpRequest,
        failure: &str,
    ) -> Result<T> {
        let resp = self.send(endpoint, req).await?;
        if resp.status == 204 || resp.body.trim().is_empty() {
            return Err(unexpected(failure, endpoint, &resp));
        }
        resp.json().map_err(|e| classify::malformed_response(endpoint, &resp, &e))
    }

    /// Follow `meta.links.next` cursors, collecting the `key` array of every page.
    async fn list_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        key: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut req = self
                .request(Method::Get, endpoint)
                .query("per_page", PER_PAGE.to_string());
            for (k, v) in query {
                req = req.query(*k, *v);
            }
            if let Some(cursor) = &cursor {
                req = req.query("cursor", cursor.clone());
            }

            let mut page: Value = self
                .document(endpoint, req, "Unknown Provider API Error")
                .await?;
            let batch = match page.get_mut(key).map(Value::take) {
                None | Some(Value::Null) => Value::Array(Vec::new()),
                Some(batch) => batch,
            };
            let batch: Vec<T> = serde_json::from_value(batch).map_err(|e| {
                ClassifiedError::upstream("Unexpected provider API response")
                    .with_data("endpoint", endpoint)
                    .with_debug("parse_error", e.to_string())
            })?;
            items.extend(batch);

            let meta: Meta = page
                .get("meta")
                .cloned()
                .and_then(|m| serde_json::from_value(m).ok())
                .unwrap_or_default();
            match meta.links.next.filter(|n| !n.is_empty()) {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }

        tracing::warn!(endpoint, max_pages = MAX_PAGES, "listing stopped at page ceiling");
        Ok(items)
    }

    // ── Instances ────────────────────────────────────────────────────

    pub async fn get_instance(&self, id: &str) -> Result<Instance> {
        let endpoint = format!("instances/{}", id.trim());
        let env: InstanceEnvelope = self
            .document(&endpoint, self.request(Method::Get, &endpoint), "Unknown Provider API Error")
            .await?;
        Ok(env.instance)
    }

    pub async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<Instance> {
        let endpoint = "instances";
        let http = self.request(Method::Post, endpoint).json(to_json(req)?);
        let env: InstanceEnvelope = self
            .document(endpoint, http, "Instance creation failed")
            .await?;
        if env.instance.id.is_empty() {
            return Err(ClassifiedError::upstream("Instance creation failed")
                .with_data("endpoint", endpoint));
        }
        Ok(env.instance)
    }

    pub async fn update_instance(&self, id: &str, req: &UpdateInstanceRequest) -> Result<Instance> {
        let endpoint = format!("instances/{}", id.trim());
        let http = self.request(Method::Patch, &endpoint).json(to_json(req)?);
        let env: InstanceEnvelope = self
            .document(&endpoint, http, "Unable to update instance")
            .await?;
        Ok(env.instance)
    }

    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        let endpoint = format!("instances/{}", id.trim());
        let req = self.request(Method::Delete, &endpoint);
        self.no_content(&endpoint, req, "Unable to delete instance").await
    }

    pub async fn start_instance(&self, id: &str) -> Result<()> {
        self.power(id, "start", "Unable to start instance").await
    }

    pub async fn halt_instance(&self, id: &str) -> Result<()> {
        self.power(id, "halt", "Unable to halt instance").await
    }

    pub async fn reboot_instance(&self, id: &str) -> Result<()> {
        self.power(id, "reboot", "Unable to reboot instance").await
    }

    async fn power(&self, id: &str, action: &str, failure: &str) -> Result<()> {
        let endpoint = format!("instances/{}/{action}", id.trim());
        let req = self.request(Method::Post, &endpoint);
        self.no_content(&endpoint, req, failure).await
    }

    /// Reinstall keeping the current OS.
    pub async fn reinstall_instance(&self, id: &str) -> Result<Instance> {
        let endpoint = format!("instances/{}/reinstall", id.trim());
        let req = self.request(Method::Post, &endpoint);
        let env: InstanceEnvelope = self
            .document(&endpoint, req, "Unable to reinstall instance")
            .await?;
        Ok(env.instance)
    }

    /// Plan ids the instance may be upgraded to.
    pub async fn upgrade_plans(&self, id: &str) -> Result<Vec<String>> {
        let endpoint = format!("instances/{}/upgrades", id.trim());
        let req = self.request(Method::Get, &endpoint).query("type", "plans");
        let env: UpgradesEnvelope = self
            .document(&endpoint, req, "Unable to get available instance upgrade plans")
            .await?;
        Ok(env.upgrades.plans)
    }

    // ── ISO ──────────────────────────────────────────────────────────

    pub async fn iso_status(&self, id: &str) -> Result<IsoStatus> {
        let endpoint = format!("instances/{}/iso", id.trim());
        let req = self.request(Method::Get, &endpoint);
        let env: IsoStatusEnvelope = self
            .document(&endpoint, req, "Unable to determine instance ISO status")
            .await?;
        Ok(env.iso_status)
    }

    pub async fn attach_iso(&self, id: &str, iso_id: &str) -> Result<IsoStatus> {
        let endpoint = format!("instances/{}/iso/attach", id.trim());
        let req = self
            .request(Method::Post, &endpoint)
            .json(to_json(&AttachIsoRequest { iso_id })?);
        let env: IsoStatusEnvelope = self
            .document(&endpoint, req, "Unable to attach ISO")
            .await?;
        Ok(env.iso_status)
    }

    pub async fn detach_iso(&self, id: &str) -> Result<IsoStatus> {
        let endpoint = format!("instances/{}/iso/detach", id.trim());
        let req = self.request(Method::Post, &endpoint);
        let env: IsoStatusEnvelope = self
            .document(&endpoint, req, "Unable to detach ISO from instance")
            .await?;
        Ok(env.iso_status)
    }

    // ── Catalogs ─────────────────────────────────────────────────────

    pub async fn regions(&self) -> Result<Vec<Region>> {
        self.list_all("regions", "regions", &[]).await
    }

    pub async fn operating_systems(&self) -> Result<Vec<OperatingSystem>> {
        self.list_all("os", "os", &[]).await
    }

    /// Cloud compute (`vc2`) plans.
    pub async fn plans(&self) -> Result<Vec<Plan>> {
        self.list_all("plans", "plans", &[("type", "vc2")]).await
    }

    pub async fn public_isos(&self) -> Result<Vec<PublicIso>> {
        self.list_all("iso-public", "public_isos", &[]).await
    }
}

fn to_json<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| ClassifiedError::validation(format!("invalid request body: {e}")))
}

fn unexpected(message: &str, endpoint: &str, resp: &HttpResponse) -> ClassifiedError {
    ClassifiedError::upstream(message)
        .with_data("endpoint", endpoint)
        .with_data("http_code", resp.status)
        .with_debug(
            "response_body",
            redact::truncate(&resp.body, redact::MAX_LOGGED_STRING),
        )
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vb_core::{ErrorKind, ReqwestTransport, TransportConfig};
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> VultrClient {
        let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
        VultrClient::new(Arc::new(transport), "TOKEN").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn follows_cursor_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions"))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "regions": [{ "id": "ams", "city": "Amsterdam", "country": "NL" }],
                "meta": { "total": 2, "links": { "next": "c2", "prev": "" } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/regions"))
            .and(query_param("cursor", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "regions": [{ "id": "lhr", "city": "London", "country": "GB" }],
                "meta": { "total": 2, "links": { "next": "", "prev": "c1" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let regions = client(&server).regions().await.unwrap();
        let ids: Vec<_> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["ams", "lhr"]);
    }

    #[tokio::test]
    async fn endless_cursor_stops_at_the_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "regions": [{ "id": "ams", "city": "Amsterdam", "country": "NL" }],
                "meta": { "total": 1, "links": { "next": "again", "prev": "" } }
            })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let regions = client(&server).regions().await.unwrap();
        assert_eq!(regions.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn power_actions_expect_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/abc/halt"))
            .and(header("authorization", "Bearer TOKEN"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/instances/abc/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let c = client(&server);
        c.halt_instance("abc").await.unwrap();
        let err = c.start_instance("abc").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        assert_eq!(err.message(), "Unable to start instance");
    }

    #[tokio::test]
    async fn attach_sends_iso_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/abc/iso/attach"))
            .and(body_json(json!({ "iso_id": "rescue-1" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "iso_status": { "state": "isomounting", "iso_id": "rescue-1" }
            })))
            .mount(&server)
            .await;

        let status = client(&server).attach_iso("abc", "rescue-1").await.unwrap();
        assert_eq!(status.state.as_deref(), Some("isomounting"));
        assert_eq!(status.mounted_iso(), Some("rescue-1"));
    }

    #[tokio::test]
    async fn missing_instance_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instances/gone"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "Invalid instance-id.", "status": 404 })),
            )
            .mount(&server)
            .await;

        let err = client(&server).get_instance("gone").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
