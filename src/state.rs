// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::audit::{DisabledLocator, GeoLocator, Ip138Locator, LoginAuditor};
use crate::auth::{Argon2Hasher, PasswordHasher, PermissionResolver, TokenCodec};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::storage::{AuthDatabase, PermissionCache};

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<AuthDatabase>,
    pub tokens: Arc<TokenCodec>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub resolver: PermissionResolver,
    pub auditor: LoginAuditor,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Production wiring: wall clock, Argon2 and ip138 when enabled.
    pub fn new(config: AppConfig, db: AuthDatabase) -> Self {
        let locator: Arc<dyn GeoLocator> = match (&config.audit.ip_parse_token, config.audit.ip_parse_enabled) {
            (Some(token), true) => match Ip138Locator::new(token.clone()) {
                Ok(locator) => Arc::new(locator),
                Err(e) => {
                    tracing::warn!(error = %e, "IP geolocation unavailable");
                    Arc::new(DisabledLocator)
                }
            },
            (None, true) => {
                tracing::warn!("IP_PARSE_ENABLE is set without IP_PARSE_TOKEN; geolocation disabled");
                Arc::new(DisabledLocator)
            }
            _ => Arc::new(DisabledLocator),
        };
        Self::from_parts(
            config,
            db,
            Arc::new(SystemClock),
            Arc::new(Argon2Hasher::new()),
            locator,
        )
    }

    /// Wire the state from explicit collaborators.
    pub fn from_parts(
        config: AppConfig,
        db: AuthDatabase,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PasswordHasher>,
        locator: Arc<dyn GeoLocator>,
    ) -> Self {
        let cache = (!config.cache.ttl.is_zero())
            .then(|| Arc::new(PermissionCache::new(config.cache.capacity, config.cache.ttl)));
        let db = Arc::new(match &cache {
            Some(cache) => db.with_permission_cache(cache.clone()),
            None => db,
        });

        let tokens = Arc::new(TokenCodec::new(&config.auth, clock.clone()));
        let resolver = PermissionResolver::new(db.clone(), cache);
        let auditor = LoginAuditor::new(db.clone(), locator, clock.clone(), config.audit.clone());

        Self {
            config: Arc::new(config),
            db,
            tokens,
            hasher,
            resolver,
            auditor,
            clock,
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::auth::password::test_hasher;
    use crate::clock::ManualClock;
    use crate::models::{Menu, MenuType, Role, User};

    pub const PHONE: &str = "13800001111";
    pub const PASSWORD: &str = "Secret123";

    pub struct TestState {
        pub state: AppState,
        pub clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    /// State on a temp database with a manual clock and inline auditing.
    pub fn test_state() -> TestState {
        test_state_with(|_| {})
    }

    pub fn test_state_with(configure: impl FnOnce(&mut AppConfig)) -> TestState {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::for_secret("test-secret");
        config.data_dir = dir.path().to_path_buf();
        config.audit.deferred = false;
        configure(&mut config);

        let db = AuthDatabase::open(&config.database_path()).unwrap();
        let clock = Arc::new(ManualClock::fixed());
        let state = AppState::from_parts(
            config,
            db,
            clock.clone(),
            Arc::new(test_hasher()),
            Arc::new(DisabledLocator),
        );
        TestState {
            state,
            clock,
            _dir: dir,
        }
    }

    /// Active staff user holding an `editor` role whose only menu grants `doc.edit`.
    pub fn seed_editor(state: &AppState) -> User {
        let docs = state
            .db
            .create_menu(
                Menu::new("Documents", "Documents", MenuType::Page)
                    .with_path("/docs", "/docs/index")
                    .with_perms("doc.edit"),
            )
            .unwrap();
        let mut role = Role::new("editor", "Editor");
        role.menu_ids.insert(docs.id);
        let role = state.db.create_role(role).unwrap();

        let mut user = User::new(PHONE, "Alice", state.hasher.hash(PASSWORD).unwrap());
        user.is_staff = true;
        user.role_ids.insert(role.id);
        state.db.create_user(user).unwrap()
    }
}
