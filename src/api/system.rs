// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{run_blocking, Authorized, RequiredPermissions},
    error::{ApiError, ErrorBody},
    models::{LoginRecordPage, PageQuery},
    state::AppState,
    storage::seed::LOGIN_RECORD_LIST_PERM,
};

/// Viewing the login audit log.
pub struct ListLoginRecords;

impl RequiredPermissions for ListLoginRecords {
    const PERMS: &'static [&'static str] = &[LOGIN_RECORD_LIST_PERM];
}

/// Optional filters for the login record listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LoginRecordFilter {
    /// Only attempts made with this phone number.
    pub phone: Option<String>,
}

/// Login attempts, newest first.
#[utoipa::path(
    get,
    path = "/system/login-records",
    params(PageQuery, LoginRecordFilter),
    tag = "System",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = LoginRecordPage),
        (status = 403, description = "Missing system.login_record.list", body = ErrorBody)
    )
)]
pub async fn list_login_records(
    State(state): State<AppState>,
    _auth: Authorized<ListLoginRecords>,
    Query(query): Query<PageQuery>,
    Query(filter): Query<LoginRecordFilter>,
) -> Result<Json<LoginRecordPage>, ApiError> {
    let (offset, limit) = query.bounds();
    let db = state.db.clone();
    let page = run_blocking(move || match filter.phone.as_deref().filter(|p| !p.is_empty()) {
        Some(phone) => {
            let matching = db.login_records_for_phone(phone)?;
            Ok(LoginRecordPage {
                total: matching.len(),
                records: matching.into_iter().skip(offset).take(limit).collect(),
            })
        }
        None => Ok(LoginRecordPage {
            records: db.list_login_records(offset, limit)?,
            total: db.count_login_records()?,
        }),
    })
    .await?;
    Ok(Json(page))
}
