// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{run_blocking, AuthError, Authorized, PermissionSet},
    error::{ApiError, ErrorBody},
    models::{EntityId, RouterNode},
    state::AppState,
};

/// The signed-in user's identity and effective permissions.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: EntityId,
    pub name: String,
    pub phone: String,
    pub roles: Vec<String>,
    /// Permission strings; `["*"]` for administrators.
    pub permissions: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/user/me",
    tag = "User",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = MeResponse),
        (status = 401, description = "Session expired", body = ErrorBody),
        (status = 403, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn me(Authorized(session, ..): Authorized) -> Json<MeResponse> {
    let permissions = session
        .permissions
        .unwrap_or_else(PermissionSet::empty)
        .to_vec();
    Json(MeResponse {
        user_id: session.identity.user_id,
        name: session.identity.name,
        phone: session.identity.phone,
        roles: session.identity.roles,
        permissions,
    })
}

/// Navigation tree for the signed-in user, sorted by order at every level.
#[utoipa::path(
    get,
    path = "/user/menus",
    tag = "User",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [RouterNode]),
        (status = 401, description = "Session expired", body = ErrorBody),
        (status = 403, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn menus(
    State(state): State<AppState>,
    Authorized(session, ..): Authorized,
) -> Result<Json<Vec<RouterNode>>, ApiError> {
    let graph = session
        .graph
        .ok_or_else(|| AuthError::Internal("role graph not loaded".to_string()))?;
    let resolver = state.resolver.clone();
    let tree = run_blocking(move || Ok(resolver.menu_tree(&graph)?)).await?;
    Ok(Json(tree))
}
