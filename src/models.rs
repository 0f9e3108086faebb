// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! Persistent entities and the request/response structures used by the REST
//! API. Entities are stored in flat tables keyed by id; relationships are
//! expressed as id sets and resolved by explicit lookups.
//!
//! ## Model Categories
//!
//! - **Identity**: [`User`], [`Role`], [`Menu`]
//! - **Auditing**: [`LoginRecord`]
//! - **Login API**: [`LoginRequest`], [`RefreshRequest`], [`TokenPair`]
//! - **Menu API**: [`RouterNode`], [`RouteMeta`]

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Primary key type for all entities.
pub type EntityId = u64;

// =============================================================================
// Identity
// =============================================================================

/// An account that can log into the admin backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: EntityId,
    /// Unique login identifier.
    pub phone: String,
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// PHC-formatted password hash. Never leaves the service.
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(default)]
    pub last_ip: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    /// Roles held by this user (shared, not owned).
    #[serde(default)]
    pub role_ids: BTreeSet<EntityId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an active, non-staff user with no roles. The id is assigned on insert.
    pub fn new(phone: impl Into<String>, name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: 0,
            phone: phone.into(),
            name: name.into(),
            nickname: None,
            password_hash: password_hash.into(),
            is_active: true,
            is_staff: false,
            last_ip: None,
            last_login_at: None,
            role_ids: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Named grouping of menus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: EntityId,
    pub role_key: String,
    pub name: String,
    /// Super-role: holders get every permission.
    pub is_admin: bool,
    #[serde(default)]
    pub menu_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl Role {
    pub fn new(role_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            role_key: role_key.into(),
            name: name.into(),
            is_admin: false,
            menu_ids: BTreeSet::new(),
            order: 0,
            description: None,
        }
    }
}

/// Kind of menu node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MenuType {
    /// Groups pages in the navigation.
    Directory,
    /// A routable view.
    Page,
    /// A button or other action inside a page.
    Action,
}

impl MenuType {
    /// Whether nodes of this type appear in the navigation tree of admins.
    pub fn is_navigable(self) -> bool {
        matches!(self, MenuType::Directory | MenuType::Page)
    }
}

/// Navigation and permission node. Menus form a tree through `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Menu {
    pub id: EntityId,
    pub title: String,
    /// Route name used by the front-end router.
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
    pub menu_type: MenuType,
    /// Permission string; `None` means the node is purely structural.
    #[serde(default)]
    pub perms: Option<String>,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub order: i32,
    /// Excluded from the client-side view cache.
    #[serde(default)]
    pub no_cache: bool,
    /// Pinned in the tab bar.
    #[serde(default)]
    pub affix: bool,
}

impl Menu {
    pub fn new(title: impl Into<String>, name: impl Into<String>, menu_type: MenuType) -> Self {
        Self {
            id: 0,
            title: title.into(),
            name: name.into(),
            icon: None,
            path: None,
            component: None,
            redirect: None,
            menu_type,
            perms: None,
            parent_id: None,
            disabled: false,
            hidden: false,
            order: 0,
            no_cache: false,
            affix: false,
        }
    }

    pub fn with_perms(mut self, perms: impl Into<String>) -> Self {
        self.perms = Some(perms.into());
        self
    }

    pub fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>, component: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self.component = Some(component.into());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

// =============================================================================
// Login API
// =============================================================================

/// How the user authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
pub enum LoginMethod {
    #[default]
    #[serde(rename = "0")]
    Password,
    #[serde(rename = "1")]
    Sms,
}

impl LoginMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginMethod::Password => "0",
            LoginMethod::Sms => "1",
        }
    }
}

/// Where the login came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
pub enum LoginPlatform {
    /// PC admin console.
    #[default]
    #[serde(rename = "0")]
    Pc,
    /// Mobile admin console.
    #[serde(rename = "1")]
    Mobile,
    /// Interactive API documentation.
    #[serde(rename = "2")]
    ApiDocs,
}

impl LoginPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginPlatform::Pc => "0",
            LoginPlatform::Mobile => "1",
            LoginPlatform::ApiDocs => "2",
        }
    }

    /// All current platforms are admin channels and therefore staff-only.
    pub fn requires_staff(self) -> bool {
        match self {
            LoginPlatform::Pc | LoginPlatform::Mobile | LoginPlatform::ApiDocs => true,
        }
    }
}

/// Request body for `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Mainland China mobile number.
    #[schema(example = "13800001111")]
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub method: LoginMethod,
    #[serde(default)]
    pub platform: LoginPlatform,
}

/// Request body for `POST /token/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `bearer`.
    pub token_type: String,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

// =============================================================================
// Menu API
// =============================================================================

/// UI hints attached to every router node.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub title: String,
    pub icon: Option<String>,
    pub hide_in_menu: bool,
    pub affix_tab: bool,
    pub order: i32,
    pub keep_alive: bool,
}

/// One node of the navigation tree returned by `GET /user/menus`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RouterNode {
    pub id: EntityId,
    pub name: String,
    pub path: Option<String>,
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    pub meta: RouteMeta,
    #[schema(no_recursion)]
    pub children: Vec<RouterNode>,
}

impl From<&Menu> for RouterNode {
    fn from(menu: &Menu) -> Self {
        Self {
            id: menu.id,
            name: menu.name.clone(),
            path: menu.path.clone(),
            component: menu.component.clone(),
            redirect: menu.redirect.clone(),
            meta: RouteMeta {
                title: menu.title.clone(),
                icon: menu.icon.clone(),
                hide_in_menu: menu.hidden,
                affix_tab: menu.affix,
                order: menu.order,
                keep_alive: !menu.no_cache,
            },
            children: Vec::new(),
        }
    }
}

// =============================================================================
// Auditing
// =============================================================================

/// Immutable record of one login attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LoginRecord {
    pub id: EntityId,
    /// Identifier the attempt was made with.
    pub phone: String,
    pub success: bool,
    pub platform: LoginPlatform,
    pub method: LoginMethod,
    pub ip: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub operator: Option<String>,
    pub postal_code: Option<String>,
    pub area_code: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    /// JSON snapshot of the request (password redacted).
    pub request: String,
    /// JSON summary of the outcome.
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Pagination query for list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    pub page: Option<usize>,
    /// Page size (default 10, max 100).
    pub limit: Option<usize>,
}

impl PageQuery {
    pub const MAX_LIMIT: usize = 100;

    /// `(offset, limit)` after applying defaults and bounds.
    pub fn bounds(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT);
        ((page - 1).saturating_mul(limit), limit)
    }
}

/// A page of login records, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginRecordPage {
    pub records: Vec<LoginRecord>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_defaults_method_and_platform() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"phone":"13800001111","password":"Secret123"}"#).unwrap();
        assert_eq!(req.method, LoginMethod::Password);
        assert_eq!(req.platform, LoginPlatform::Pc);
    }

    #[test]
    fn login_enums_use_numeric_string_wire_values() {
        let req: LoginRequest = serde_json::from_str(
            r#"{"phone":"13800001111","password":"x","method":"1","platform":"2"}"#,
        )
        .unwrap();
        assert_eq!(req.method, LoginMethod::Sms);
        assert_eq!(req.platform, LoginPlatform::ApiDocs);
        assert_eq!(serde_json::to_string(&LoginPlatform::Mobile).unwrap(), r#""1""#);
    }

    #[test]
    fn router_node_meta_is_camel_case() {
        let mut menu = Menu::new("Docs", "docs", MenuType::Page).with_order(3);
        menu.hidden = true;
        menu.no_cache = true;
        let node = RouterNode::from(&menu);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["meta"]["hideInMenu"], true);
        assert_eq!(json["meta"]["keepAlive"], false);
        assert_eq!(json["meta"]["order"], 3);
        assert!(json.get("redirect").is_none());
    }

    #[test]
    fn page_query_bounds() {
        let q = PageQuery { page: None, limit: None };
        assert_eq!(q.bounds(), (0, 10));
        let q = PageQuery { page: Some(3), limit: Some(500) };
        assert_eq!(q.bounds(), (200, 100));
        let q = PageQuery { page: Some(0), limit: Some(0) };
        assert_eq!(q.bounds(), (0, 1));
        let q = PageQuery { page: Some(usize::MAX), limit: Some(100) };
        assert_eq!(q.bounds(), (usize::MAX, 100));
    }

    #[test]
    fn only_directories_and_pages_are_navigable() {
        assert!(MenuType::Directory.is_navigable());
        assert!(MenuType::Page.is_navigable());
        assert!(!MenuType::Action.is_navigable());
    }
}
