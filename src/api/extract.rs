// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request extractors shared by the handlers.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldError};

/// JSON body whose rejections become field-level validation errors.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(vec![rejection_field(&rejection)])),
        }
    }
}

/// Best guess at which field a JSON rejection is about.
fn rejection_field(rejection: &JsonRejection) -> FieldError {
    let text = rejection.body_text();
    let detail = match text.split_once("target type: ") {
        Some((_, detail)) => detail,
        None => return FieldError::new("body", text.clone()),
    };

    if let Some((_, rest)) = detail.split_once("missing field `") {
        let field = rest.split('`').next().unwrap_or("body");
        return FieldError::new(field, "This field is required");
    }
    match detail.split_once(": ") {
        Some((path, message)) if !path.contains(' ') => FieldError::new(path, message),
        _ => FieldError::new("body", detail),
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(forwarded_ip(&parts.headers).or(peer)))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Form {
        phone: String,
        count: u32,
    }

    async fn reject(body: &'static str) -> FieldError {
        let req = HttpRequest::post("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let err = ApiJson::<Form>::from_request(req, &()).await.err().unwrap();
        err.fields.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn missing_field_is_named() {
        assert_eq!(reject(r#"{"phone":"1"}"#).await.field, "count");
    }

    #[tokio::test]
    async fn wrong_type_is_named() {
        assert_eq!(reject(r#"{"phone":"1","count":"x"}"#).await.field, "count");
    }

    #[tokio::test]
    async fn syntax_errors_point_at_body() {
        assert_eq!(reject("{nope").await.field, "body");
    }

    #[tokio::test]
    async fn client_ip_prefers_forwarded_headers() {
        let (mut parts, _) = HttpRequest::get("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(())
            .unwrap()
            .into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));

        let (mut parts, _) = HttpRequest::get("/")
            .header("x-real-ip", "198.51.100.2")
            .body(())
            .unwrap()
            .into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip.as_deref(), Some("198.51.100.2"));
    }

    #[tokio::test]
    async fn client_ip_falls_back_to_peer() {
        let (mut parts, _) = HttpRequest::get("/").body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap()));
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip.as_deref(), Some("192.0.2.1"));
    }
}
