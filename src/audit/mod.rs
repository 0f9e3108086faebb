// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Login Auditing
//!
//! Every login attempt produces exactly one [`LoginRecord`], whatever the
//! outcome. Recording never fails the login: storage and lookup errors are
//! logged and swallowed.

pub mod geo;
pub mod user_agent;

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use serde_json::{json, Map, Value};

use crate::clock::Clock;
use crate::config::AuditSettings;
use crate::models::{LoginMethod, LoginPlatform, LoginRecord, LoginRequest};
use crate::storage::AuthDatabase;

pub use geo::{DisabledLocator, GeoLocation, GeoLocator, Ip138Locator};
pub use user_agent::parse_user_agent;

const REDACTED: &str = "******";

/// What is known about a login attempt before its outcome.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub phone: String,
    pub method: LoginMethod,
    pub platform: LoginPlatform,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Forensic snapshot of the request, credentials removed.
    pub request: Value,
}

impl LoginAttempt {
    pub fn new(body: &LoginRequest, headers: &HeaderMap, ip: Option<String>) -> Self {
        Self {
            phone: body.phone.clone(),
            method: body.method,
            platform: body.platform,
            ip,
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            request: request_snapshot(body, headers),
        }
    }
}

/// Request body with the password redacted, plus headers without credentials.
pub fn request_snapshot(body: &LoginRequest, headers: &HeaderMap) -> Value {
    let mut header_map = Map::new();
    for (name, value) in headers {
        if *name == header::AUTHORIZATION || *name == header::COOKIE {
            continue;
        }
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    json!({
        "body": {
            "phone": body.phone,
            "password": REDACTED,
            "method": body.method.as_str(),
            "platform": body.platform.as_str(),
        },
        "headers": header_map,
    })
}

/// Writes login records.
#[derive(Clone)]
pub struct LoginAuditor {
    db: Arc<AuthDatabase>,
    locator: Arc<dyn GeoLocator>,
    clock: Arc<dyn Clock>,
    settings: AuditSettings,
}

impl LoginAuditor {
    pub fn new(
        db: Arc<AuthDatabase>,
        locator: Arc<dyn GeoLocator>,
        clock: Arc<dyn Clock>,
        settings: AuditSettings,
    ) -> Self {
        Self {
            db,
            locator,
            clock,
            settings,
        }
    }

    /// Record the attempt, off the response path when configured to.
    pub async fn dispatch(&self, attempt: LoginAttempt, success: bool, response: Value) {
        if !self.settings.enabled {
            return;
        }
        if self.settings.deferred {
            let auditor = self.clone();
            tokio::spawn(async move { auditor.record(attempt, success, response).await });
        } else {
            self.record(attempt, success, response).await;
        }
    }

    /// Record the attempt now. Never fails; problems are logged.
    pub async fn record(&self, attempt: LoginAttempt, success: bool, response: Value) {
        let location = match (&attempt.ip, self.settings.ip_parse_enabled) {
            (Some(ip), true) => self.locator.locate(ip).await,
            _ => GeoLocation::default(),
        };
        let record = build_record(attempt, success, &response, location, self.clock.now());
        let phone = record.phone.clone();

        let db = self.db.clone();
        let outcome = tokio::task::spawn_blocking(move || db.append_login_record(record)).await;
        match outcome {
            Ok(Ok(saved)) => {
                tracing::debug!(record_id = saved.id, phone = %phone, success, "Login attempt recorded");
            }
            Ok(Err(e)) => {
                tracing::error!(phone = %phone, error = %e, "Failed to write login record");
            }
            Err(e) => {
                tracing::error!(phone = %phone, error = %e, "Login record task failed");
            }
        }
    }
}

/// Assemble the record for an attempt.
pub fn build_record(
    attempt: LoginAttempt,
    success: bool,
    response: &Value,
    location: GeoLocation,
    at: chrono::DateTime<chrono::Utc>,
) -> LoginRecord {
    let (browser, os) = attempt
        .user_agent
        .as_deref()
        .map(parse_user_agent)
        .unwrap_or_default();

    LoginRecord {
        id: 0,
        phone: attempt.phone,
        success,
        platform: attempt.platform,
        method: attempt.method,
        ip: attempt.ip,
        address: location.address,
        country: location.country,
        province: location.province,
        city: location.city,
        county: location.county,
        operator: location.operator,
        postal_code: location.postal_code,
        area_code: location.area_code,
        browser,
        os,
        request: attempt.request.to_string(),
        response: response.to_string(),
        created_at: at,
    }
}
