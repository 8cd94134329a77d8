use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use vb_infra::types::{
    ChangePasswordParams, ConnectionInfo, ConnectionParams, CreateParams, InstanceId, IsoStatus,
    ReinstallParams, Reply, ResizeParams, ServerInfo,
};
use vb_infra::{ProviderName, ServerProvider};

use crate::auth::RequestId;
use crate::error::{ApiError, CallContext};
use crate::state::AppState;

type InfoReply = Result<Json<Reply<ServerInfo>>, ApiError>;

fn lookup(state: &AppState, name: &str) -> Result<Arc<dyn ServerProvider>, ApiError> {
    let parsed: ProviderName = name
        .parse()
        .map_err(|_| ApiError::UnknownProvider(name.to_string()))?;
    state
        .providers
        .get(parsed)
        .cloned()
        .ok_or_else(|| ApiError::UnknownProvider(name.to_string()))
}

fn context<'a>(
    request_id: RequestId,
    provider: &dyn ServerProvider,
    operation: &'static str,
    instance_id: Option<&'a InstanceId>,
) -> CallContext<'a> {
    CallContext {
        request_id,
        provider: provider.name(),
        operation,
        instance_id,
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(name): Path<String>,
    Json(params): Json<CreateParams>,
) -> Result<(StatusCode, Json<Reply<ServerInfo>>), ApiError> {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "create", None);

    let reply = provider.create(&params).await.map_err(|e| ctx.fail(e))?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn get_info(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "get_info", Some(&id));

    let reply = provider.get_info(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

/// `POST` so that application credentials travel in the body.
pub async fn get_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
    params: Option<Json<ConnectionParams>>,
) -> Result<Json<Reply<ConnectionInfo>>, ApiError> {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "get_connection", Some(&id));
    let params = params.map(|Json(p)| p).unwrap_or_default();

    let reply = provider
        .get_connection(&id, &params)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn change_root_password(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
    Json(params): Json<ChangePasswordParams>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "change_root_password", Some(&id));

    let reply = provider
        .change_root_password(&id, &params)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn resize(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
    Json(params): Json<ResizeParams>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "resize", Some(&id));

    let reply = provider.resize(&id, &params).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn reinstall(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
    Json(params): Json<ReinstallParams>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "reinstall", Some(&id));

    let reply = provider
        .reinstall(&id, &params)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn reboot(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "reboot", Some(&id));

    let reply = provider.reboot(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn power_on(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "power_on", Some(&id));

    let reply = provider.power_on(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn shutdown(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "shutdown", Some(&id));

    let reply = provider.shutdown(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn suspend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "suspend", Some(&id));

    let reply = provider.suspend(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn unsuspend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "unsuspend", Some(&id));

    let reply = provider.unsuspend(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn attach_recovery_iso(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "attach_recovery_iso", Some(&id));

    let reply = provider
        .attach_recovery_iso(&id)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn detach_recovery_iso(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> InfoReply {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "detach_recovery_iso", Some(&id));

    let reply = provider
        .detach_recovery_iso(&id)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn recovery_iso_status(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> Result<Json<Reply<IsoStatus>>, ApiError> {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "recovery_iso_status", Some(&id));

    let reply = provider
        .recovery_iso_status(&id)
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}

pub async fn terminate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((name, id)): Path<(String, InstanceId)>,
) -> Result<Json<Reply<()>>, ApiError> {
    let provider = lookup(&state, &name)?;
    let ctx = context(request_id, provider.as_ref(), "terminate", Some(&id));

    let reply = provider.terminate(&id).await.map_err(|e| ctx.fail(e))?;
    Ok(Json(reply))
}
