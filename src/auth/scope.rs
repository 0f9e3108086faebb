// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request scratch space shared between the gate and the response path.
//!
//! The middleware installs a fresh [`RequestScope`] before routing. The auth
//! gate records the resolved identity and the refresh hint on it; after the
//! handler runs the middleware turns the hint into the `if-refresh` response
//! header and logs who made the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::gate::Identity;

/// Response header telling the client to refresh its token pair soon.
pub const REFRESH_HINT_HEADER: HeaderName = HeaderName::from_static("if-refresh");

#[derive(Default)]
struct ScopeInner {
    refresh_hint: AtomicBool,
    identity: Mutex<Option<Identity>>,
}

/// Request-scoped context, stored in request extensions.
#[derive(Clone, Default)]
pub struct RequestScope(Arc<ScopeInner>);

impl RequestScope {
    pub fn flag_refresh(&self) {
        self.0.refresh_hint.store(true, Ordering::Relaxed);
    }

    pub fn refresh_hinted(&self) -> bool {
        self.0.refresh_hint.load(Ordering::Relaxed)
    }

    pub fn set_identity(&self, identity: Identity) {
        if let Ok(mut slot) = self.0.identity.lock() {
            *slot = Some(identity);
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.0.identity.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Middleware installing a [`RequestScope`] and emitting the refresh hint.
pub async fn request_scope(mut request: Request, next: Next) -> Response {
    let scope = RequestScope::default();
    request.extensions_mut().insert(scope.clone());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let hint = if scope.refresh_hinted() { "1" } else { "0" };
    response
        .headers_mut()
        .insert(REFRESH_HINT_HEADER, HeaderValue::from_static(hint));

    if let Some(identity) = scope.identity() {
        tracing::info!(
            user_id = identity.user_id,
            name = %identity.name,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            "Authenticated request"
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn hinting(Extension(scope): Extension<RequestScope>) -> &'static str {
        scope.flag_refresh();
        "ok"
    }

    fn app() -> Router {
        Router::new()
            .route("/plain", get(|| async { "ok" }))
            .route("/hint", get(hinting))
            .layer(axum::middleware::from_fn(request_scope))
    }

    #[tokio::test]
    async fn header_defaults_to_zero() {
        let response = app()
            .oneshot(HttpRequest::get("/plain").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[REFRESH_HINT_HEADER], "0");
    }

    #[tokio::test]
    async fn flagged_scope_sets_header() {
        let response = app()
            .oneshot(HttpRequest::get("/hint").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[REFRESH_HINT_HEADER], "1");
    }

    #[test]
    fn identity_round_trips_through_scope() {
        let scope = RequestScope::default();
        assert!(scope.identity().is_none());
        scope.set_identity(Identity {
            user_id: 3,
            name: "Alice".into(),
            phone: "13800001111".into(),
            roles: vec!["Editor".into()],
        });
        assert_eq!(scope.identity().unwrap().user_id, 3);
    }
}
