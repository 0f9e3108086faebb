// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Phone/password login, HS256 access/refresh tokens and role-based
//! permission checks for the admin API.
//!
//! ## Auth Flow
//!
//! 1. Client posts phone + password to `/login`
//! 2. Server verifies the credentials and account gates, returns a token pair
//! 3. Client sends `Authorization: Bearer <access token>`
//! 4. Server:
//!    - Verifies signature and expiry (expired → `SessionExpired`)
//!    - Rejects refresh tokens on normal routes
//!    - Loads the user (and roles/menus when the route declares permissions)
//!    - Sets `if-refresh: 1` when the token is about to expire
//! 5. Client exchanges the refresh token at `/token/refresh`
//!
//! ## Security
//!
//! - Tokens are never stored; they are invalidated only by expiry
//! - Passwords are Argon2id PHC strings with per-hash salts
//! - Admin roles short-circuit every permission check

pub mod credentials;
pub mod error;
pub mod gate;
pub mod password;
pub mod permissions;
pub mod scope;
pub mod token;

pub use credentials::{authenticate, is_valid_phone};
pub use error::AuthError;
pub use gate::{
    authenticate_request, Auth, AuthSession, Authorized, GateOptions, Identity, OpenAuth,
    RequiredPermissions, SignedIn,
};
pub use password::{Argon2Hasher, PasswordHasher};
pub use permissions::{PermissionResolver, PermissionSet};
pub use scope::{request_scope, RequestScope, REFRESH_HINT_HEADER};
pub use token::{Claims, TokenCodec, TokenError, TokenKind};

/// Run blocking storage or hashing work off the async executor.
pub async fn run_blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(format!("blocking task failed: {e}")))?
}
