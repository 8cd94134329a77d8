use std::sync::Arc;

use serde_json::{Value, json};
use vb_core::{ErrorKind, ReqwestTransport, TransportConfig};
use vb_infra::ResizePolicy;
use vb_infra::ServerProvider;
use vb_infra::types::{InstanceId, ReinstallParams, ResizeParams, ServerState};
use vb_infra::vultr::{VultrConfig, VultrProvider};
use vultr_api::VultrClient;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ID: &str = "cb676a46-66fd-4dfb-b839-443f2e6c0b60";

fn provider(server: &MockServer, resize_policy: ResizePolicy) -> VultrProvider {
    let config = VultrConfig {
        api_token: "TOKEN".into(),
        resize_policy,
    };
    let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
    let client = VultrClient::new(Arc::new(transport), config.api_token.clone())
        .with_base_url(server.uri());
    VultrProvider::with_client(&config, client)
}

fn instance(power_status: &str) -> Value {
    json!({
        "instance": {
            "id": ID,
            "os": "Ubuntu 22.04 x64",
            "os_id": 1743,
            "ram": 1024,
            "disk": 25,
            "vcpu_count": 1,
            "main_ip": "192.0.2.44",
            "region": "lhr",
            "plan": "vc2-1c-1gb",
            "date_created": "2024-03-01T12:30:00+00:00",
            "status": "active",
            "power_status": power_status,
            "server_status": "ok",
            "label": "web1",
            "hostname": "web1.example.com"
        }
    })
}

async fn mount_instance(server: &MockServer, power_status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}")))
        .and(header("authorization", "Bearer TOKEN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance(power_status)))
        .mount(server)
        .await;
}

async fn mount_regions(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/regions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "regions": [{ "id": "lhr", "city": "London", "country": "GB", "continent": "Europe" }],
            "meta": { "total": 1, "links": { "next": "", "prev": "" } }
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_public_isos(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/iso-public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public_isos": [
                { "id": "iso-alpine", "name": "Alpine Linux" },
                { "id": "iso-rescue", "name": "SystemRescue", "description": "Rescue toolkit" }
            ],
            "meta": { "total": 2, "links": { "next": "", "prev": "" } }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn region_catalog_is_fetched_once() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;

    let provider = provider(&server, ResizePolicy::AllowRunning);
    let id = InstanceId::from(ID);
    let first = provider.get_info(&id).await.unwrap().value;
    let second = provider.get_info(&id).await.unwrap().value;

    assert_eq!(first.location, "London, GB");
    assert_eq!(second.location, "London, GB");
    assert_eq!(first.state, ServerState::Running);
    assert_eq!(first.size, "vc2-1c-1gb");
    assert_eq!(first.disk_mb, 25 * 1024);
}

#[tokio::test]
async fn missing_instance_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "Invalid instance-id.",
            "status": 404
        })))
        .mount(&server)
        .await;

    let err = provider(&server, ResizePolicy::AllowRunning)
        .get_info(&InstanceId::from("gone"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.data()["http_code"], json!(404));
}

#[tokio::test]
async fn attach_then_status_reports_recovery_iso() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    mount_public_isos(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/iso/attach")))
        .and(body_json(json!({ "iso_id": "iso-rescue" })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "iso_status": { "state": "isomounting", "iso_id": "iso-rescue" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}/iso")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iso_status": { "state": "isomounted", "iso_id": "iso-rescue" }
        })))
        .mount(&server)
        .await;

    let provider = provider(&server, ResizePolicy::AllowRunning);
    let id = InstanceId::from(ID);

    let attached = provider.attach_recovery_iso(&id).await.unwrap();
    assert_eq!(attached.message, "Recovery ISO attached");

    let status = provider.recovery_iso_status(&id).await.unwrap().value;
    assert_eq!(status.iso_id.as_deref(), Some("iso-rescue"));
    assert_eq!(status.state, "isomounted");
}

#[tokio::test]
async fn attach_fails_when_another_iso_ends_up_mounted() {
    let server = MockServer::start().await;
    mount_public_isos(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/iso/attach")))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "iso_status": { "state": "isomounting", "iso_id": "iso-rescue" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}/iso")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iso_status": { "state": "isomounted", "iso_id": "iso-alpine" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server, ResizePolicy::AllowRunning)
        .attach_recovery_iso(&InstanceId::from(ID))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamError);
    assert_eq!(err.message(), "Unable to attach recovery ISO (iso mismatch)");
}

#[tokio::test]
async fn detach_refuses_an_unrelated_iso() {
    let server = MockServer::start().await;
    mount_public_isos(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}/iso")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iso_status": { "state": "isomounted", "iso_id": "iso-alpine" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/iso/detach")))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "iso_status": { "state": "isounmounting" }
        })))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server, ResizePolicy::AllowRunning)
        .detach_recovery_iso(&InstanceId::from(ID))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.data()["iso_id"], json!("iso-alpine"));
}

#[tokio::test]
async fn detach_with_nothing_mounted_is_a_no_op() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    mount_public_isos(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}/iso")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iso_status": { "state": "ready" }
        })))
        .mount(&server)
        .await;

    let reply = provider(&server, ResizePolicy::AllowRunning)
        .detach_recovery_iso(&InstanceId::from(ID))
        .await
        .unwrap();

    assert_eq!(reply.message, "No ISO attached");
}

#[tokio::test]
async fn resize_requires_an_offered_upgrade() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plans": [
                { "id": "vc2-1c-1gb", "vcpu_count": 1, "ram": 1024, "disk": 25, "type": "vc2" },
                { "id": "vc2-2c-4gb", "vcpu_count": 2, "ram": 4096, "disk": 80, "type": "vc2" }
            ],
            "meta": { "total": 2, "links": { "next": "", "prev": "" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/instances/{ID}/upgrades")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upgrades": { "plans": ["vc2-2c-2gb"] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/instances/{ID}")))
        .respond_with(ResponseTemplate::new(202).set_body_json(instance("running")))
        .expect(0)
        .mount(&server)
        .await;

    let params = ResizeParams {
        size: "vc2-2c-4gb".into(),
        resize_running: false,
    };
    let err = provider(&server, ResizePolicy::AllowRunning)
        .resize(&InstanceId::from(ID), &params)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(err.data()["plan"], json!("vc2-2c-4gb"));
}

#[tokio::test]
async fn require_stopped_policy_rejects_running_resize() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;

    let params = ResizeParams {
        size: "vc2-2c-4gb".into(),
        resize_running: false,
    };
    let err = provider(&server, ResizePolicy::RequireStopped)
        .resize(&InstanceId::from(ID), &params)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn reinstall_with_same_os_uses_reinstall_endpoint() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/os"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "os": [
                { "id": 1743, "name": "Ubuntu 22.04 x64", "arch": "x64", "family": "ubuntu" },
                { "id": 2136, "name": "Debian 12 x64 (bookworm)", "arch": "x64", "family": "debian" }
            ],
            "meta": { "total": 2, "links": { "next": "", "prev": "" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/reinstall")))
        .respond_with(ResponseTemplate::new(202).set_body_json(instance("running")))
        .expect(1)
        .mount(&server)
        .await;

    let params = ReinstallParams {
        image: "Ubuntu 22.04 x64".into(),
    };
    let reply = provider(&server, ResizePolicy::AllowRunning)
        .reinstall(&InstanceId::from(ID), &params)
        .await
        .unwrap();

    assert_eq!(reply.value.state, ServerState::Rebuilding);
}

#[tokio::test]
async fn change_root_password_is_unsupported_without_remote_calls() {
    let server = MockServer::start().await;

    let params = vb_infra::types::ChangePasswordParams {
        root_password: "n3w-Secret".into(),
    };
    let err = provider(&server, ResizePolicy::AllowRunning)
        .change_root_password(&InstanceId::from(ID), &params)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn power_on_is_a_no_op_when_running() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/start")))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let reply = provider(&server, ResizePolicy::AllowRunning)
        .power_on(&InstanceId::from(ID))
        .await
        .unwrap();

    assert_eq!(reply.message, "Virtual server already on");
    assert_eq!(reply.value.state, ServerState::Running);
}

#[tokio::test]
async fn shutdown_is_a_no_op_when_stopped() {
    let server = MockServer::start().await;
    mount_instance(&server, "stopped").await;
    mount_regions(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/halt")))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let reply = provider(&server, ResizePolicy::AllowRunning)
        .shutdown(&InstanceId::from(ID))
        .await
        .unwrap();

    assert_eq!(reply.message, "Virtual server already off");
    assert_eq!(reply.value.state, ServerState::Off);
}

#[tokio::test]
async fn shutdown_halts_a_running_instance() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    mount_regions(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/instances/{ID}/halt")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let reply = provider(&server, ResizePolicy::AllowRunning)
        .shutdown(&InstanceId::from(ID))
        .await
        .unwrap();

    assert_eq!(reply.value.state, ServerState::Stopping);
}

#[tokio::test]
async fn region_catalog_follows_the_cursor() {
    let server = MockServer::start().await;
    mount_instance(&server, "running").await;
    Mock::given(method("GET"))
        .and(path("/regions"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "regions": [{ "id": "ewr", "city": "New Jersey", "country": "US" }],
            "meta": { "total": 3, "links": { "next": "cGFnZS0y", "prev": "" } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/regions"))
        .and(query_param("cursor", "cGFnZS0y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "regions": [{ "id": "ams", "city": "Amsterdam", "country": "NL" }],
            "meta": { "total": 3, "links": { "next": "cGFnZS0z", "prev": "" } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/regions"))
        .and(query_param("cursor", "cGFnZS0z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "regions": [{ "id": "lhr", "city": "London", "country": "GB" }],
            "meta": { "total": 3, "links": { "next": "", "prev": "cGFnZS0y" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = provider(&server, ResizePolicy::AllowRunning)
        .get_info(&InstanceId::from(ID))
        .await
        .unwrap()
        .value;

    assert_eq!(info.location, "London, GB");
}
