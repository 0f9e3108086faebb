// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{request_scope, Identity},
    error::{ErrorBody, FieldError},
    models::{
        LoginMethod, LoginPlatform, LoginRecord, LoginRecordPage, LoginRequest, RefreshRequest,
        RouteMeta, RouterNode, TokenPair,
    },
    state::AppState,
};

pub mod extract;
pub mod health;
pub mod login;
pub mod system;
pub mod user;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/login", post(login::login))
        .route("/token/refresh", post(login::refresh_token))
        .route("/auth/session", get(login::session_status))
        .route("/user/me", get(user::me))
        .route("/user/menus", get(user::menus))
        .route("/system/login-records", get(system::list_login_records))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_scope))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        login::login,
        login::refresh_token,
        login::session_status,
        user::me,
        user::menus,
        system::list_login_records,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            LoginRequest,
            LoginMethod,
            LoginPlatform,
            RefreshRequest,
            TokenPair,
            RouterNode,
            RouteMeta,
            LoginRecord,
            LoginRecordPage,
            Identity,
            ErrorBody,
            FieldError,
            login::SessionStatus,
            user::MeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token refresh"),
        (name = "User", description = "Signed-in user's identity and navigation"),
        (name = "System", description = "Login audit log"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;
