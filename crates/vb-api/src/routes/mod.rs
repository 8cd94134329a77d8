pub mod servers;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};

use crate::auth::{auth_middleware, request_id_middleware};
use crate::dto::ProvidersResponse;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/providers", get(list_providers))
        // Lifecycle
        .route("/servers/{provider}", post(servers::create))
        .route(
            "/servers/{provider}/{id}",
            get(servers::get_info).delete(servers::terminate),
        )
        .route("/servers/{provider}/{id}/connection", post(servers::get_connection))
        .route("/servers/{provider}/{id}/password", post(servers::change_root_password))
        .route("/servers/{provider}/{id}/resize", post(servers::resize))
        .route("/servers/{provider}/{id}/reinstall", post(servers::reinstall))
        // Power
        .route("/servers/{provider}/{id}/reboot", post(servers::reboot))
        .route("/servers/{provider}/{id}/power-on", post(servers::power_on))
        .route("/servers/{provider}/{id}/shutdown", post(servers::shutdown))
        .route("/servers/{provider}/{id}/suspend", post(servers::suspend))
        .route("/servers/{provider}/{id}/unsuspend", post(servers::unsuspend))
        // Recovery ISO
        .route(
            "/servers/{provider}/{id}/recovery-iso",
            get(servers::recovery_iso_status)
                .post(servers::attach_recovery_iso)
                .delete(servers::detach_recovery_iso),
        )
        // Auth middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(authed)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.providers.available(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use vb_core::{ClassifiedError, ErrorKind, Result};
    use vb_infra::types::{
        ConnectionInfo, ConnectionParams, CreateParams, InstanceId, ReinstallParams, Reply,
        ServerInfo, ServerState, UNKNOWN,
    };
    use vb_infra::{ProviderName, ProviderRegistry, ServerProvider};

    use super::*;
    use crate::config::AppConfig;
    use crate::error::status_for;

    const KEY: &str = "test-key";

    /// Knows one instance, `abc`, which is running.
    struct StubProvider;

    fn snapshot(id: InstanceId, state: ServerState) -> ServerInfo {
        ServerInfo {
            instance_id: id,
            state,
            suspended: false,
            label: "web1".into(),
            hostname: UNKNOWN.into(),
            ip_address: "192.0.2.1".into(),
            image: UNKNOWN.into(),
            size: "vc2-1c-1gb".into(),
            location: "London, GB".into(),
            node: None,
            virtualization_type: "kvm".into(),
            memory_mb: 1024,
            cpu_cores: 1,
            disk_mb: 25 * 1024,
            created_at: None,
            updated_at: None,
        }
    }

    impl StubProvider {
        fn info(id: &InstanceId) -> Result<ServerInfo> {
            if id.as_str() != "abc" {
                return Err(ClassifiedError::not_found("Instance not found")
                    .with_data("instance_id", id.as_str())
                    .with_debug("response_data", json!({ "error": "Invalid instance-id." })));
            }
            Ok(snapshot(id.clone(), ServerState::Running))
        }
    }

    #[async_trait]
    impl ServerProvider for StubProvider {
        fn name(&self) -> ProviderName {
            ProviderName::Vultr
        }

        async fn create(&self, params: &CreateParams) -> Result<Reply<ServerInfo>> {
            let info = snapshot(InstanceId::from("abc"), ServerState::Pending);
            Ok(Reply::new(format!("created {}", params.label), info))
        }

        async fn get_info(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("Server info obtained", Self::info(id)?))
        }

        async fn get_connection(
            &self,
            id: &InstanceId,
            _params: &ConnectionParams,
        ) -> Result<Reply<ConnectionInfo>> {
            Self::info(id)?;
            Ok(Reply::new(
                "SSH command generated",
                ConnectionInfo::Ssh {
                    command: "ssh root@192.0.2.1".into(),
                    password: None,
                },
            ))
        }

        async fn reinstall(&self, id: &InstanceId, _params: &ReinstallParams) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("reinstalling", Self::info(id)?.with_state(ServerState::Rebuilding)))
        }

        async fn reboot(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("rebooting", Self::info(id)?.with_state(ServerState::Restarting)))
        }

        async fn power_on(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("Virtual server already on", Self::info(id)?))
        }

        async fn shutdown(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("stopping", Self::info(id)?.with_state(ServerState::Stopping)))
        }

        async fn suspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("suspended", Self::info(id)?.with_suspended(true)))
        }

        async fn unsuspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>> {
            Ok(Reply::new("unsuspended", Self::info(id)?))
        }
    }

    fn app() -> Router {
        let mut providers = ProviderRegistry::new();
        providers.insert(Arc::new(StubProvider));
        api_router(AppState {
            providers,
            config: AppConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                control_plane_api_key: KEY.into(),
            },
        })
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_api_key() {
        let req = Request::builder()
            .uri("/providers")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn lists_configured_providers() {
        let resp = app().oneshot(request("GET", "/providers", None)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "providers": ["vultr"] }));
    }

    #[tokio::test]
    async fn returns_snapshot() {
        let resp = app()
            .oneshot(request("GET", "/servers/vultr/abc", None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Server info obtained");
        assert_eq!(body["value"]["state"], "running");
        assert_eq!(body["value"]["hostname"], "Unknown");
    }

    #[tokio::test]
    async fn create_answers_201() {
        let body = json!({
            "label": "web1",
            "size": "vc2-1c-1gb",
            "image": "Ubuntu 22.04 x64",
            "location": "lhr"
        });
        let resp = app()
            .oneshot(request("POST", "/servers/vultr", Some(body)))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["message"], "created web1");
    }

    #[tokio::test]
    async fn not_found_carries_context_but_no_debug() {
        let resp = app()
            .oneshot(request("GET", "/servers/vultr/gone", None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let request_id = resp.headers()["x-request-id"].to_str().unwrap().to_string();
        let body = json_body(resp).await;
        let error = &body["error"];

        assert_eq!(error["kind"], "not_found");
        assert_eq!(error["message"], "Instance not found");
        assert_eq!(error["data"]["instance_id"], "gone");
        assert_eq!(error["data"]["provider"], "vultr");
        assert_eq!(error["data"]["operation"], "get_info");
        assert_eq!(error["data"]["request_id"], request_id.as_str());
        assert!(error.get("debug").is_none());
        assert!(!body.to_string().contains("Invalid instance-id."));
    }

    #[tokio::test]
    async fn unsupported_operation_is_501() {
        let resp = app()
            .oneshot(request("POST", "/servers/vultr/abc/resize", Some(json!({ "size": "big" }))))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(json_body(resp).await["error"]["data"]["operation"], "resize");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_404() {
        let resp = app()
            .oneshot(request("GET", "/servers/virtualizor/42", None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"]["kind"], "unknown_provider");
    }

    #[tokio::test]
    async fn connection_without_body_uses_defaults() {
        let resp = app()
            .oneshot(request("POST", "/servers/vultr/abc/connection", None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["value"]["type"], "ssh");
        assert_eq!(body["value"]["command"], "ssh root@192.0.2.1");
    }

    #[test]
    fn backend_credential_rejection_is_a_gateway_error() {
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::ValidationFailed), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
