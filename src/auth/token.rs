// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed access and refresh tokens.
//!
//! Both kinds are HS256 JWTs with the same shape; only the `is_refresh`
//! claim tells them apart. Expiry is checked against the injected [`Clock`]
//! rather than by the JWT library so the boundary is exact (`now >= exp`
//! is expired) and testable.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::AuthSettings;
use crate::models::{EntityId, TokenPair};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Unparseable, bad signature, or unexpected claims.
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token has expired")]
    Expired,
    /// An access token where a refresh token was required, or the reverse.
    #[error("wrong token kind")]
    WrongKind,
    #[error("failed to sign token: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn is_refresh(self) -> bool {
        matches!(self, TokenKind::Refresh)
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id as a decimal string.
    pub sub: String,
    pub is_refresh: bool,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl Claims {
    pub fn kind(&self) -> TokenKind {
        if self.is_refresh {
            TokenKind::Refresh
        } else {
            TokenKind::Access
        }
    }

    /// The subject parsed back into a user id.
    pub fn user_id(&self) -> Result<EntityId, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Malformed(format!("subject {:?} is not a user id", self.sub)))
    }
}

/// Issues and verifies tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    refresh_buffer: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(settings: &AuthSettings, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            refresh_buffer: settings.refresh_buffer,
            clock,
        }
    }

    /// Sign a token for `user_id` expiring `ttl` from now.
    pub fn issue(&self, user_id: EntityId, kind: TokenKind, ttl: Duration) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            is_refresh: kind.is_refresh(),
            exp: (self.clock.now() + ttl).timestamp(),
        };
        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Access and refresh token with the configured lifetimes.
    pub fn issue_pair(&self, user_id: EntityId) -> Result<TokenPair, TokenError> {
        Ok(TokenPair::bearer(
            self.issue(user_id, TokenKind::Access, self.access_ttl)?,
            self.issue(user_id, TokenKind::Refresh, self.refresh_ttl)?,
        ))
    }

    /// Verify signature and expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }

    /// [`decode`](Self::decode), then require the given kind.
    pub fn decode_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind() != kind {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }

    /// Whether the token expires within the configured buffer. Advisory only.
    pub fn needs_refresh(&self, claims: &Claims) -> bool {
        self.needs_refresh_within(claims, self.refresh_buffer)
    }

    pub fn needs_refresh_within(&self, claims: &Claims, buffer: Duration) -> bool {
        (self.clock.now() + buffer).timestamp() >= claims.exp
    }

    /// Exchange a refresh token for a new pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.decode_kind(refresh_token, TokenKind::Refresh)?;
        self.issue_pair(claims.user_id()?)
    }
}
