// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Admin Auth - Admin Backend Authentication Service
//!
//! Phone/password login, JWT access/refresh token lifecycle, role → menu
//! permission resolution and login auditing for the admin console.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `audit` - Login attempt records with device and geo metadata
//! - `auth` - Credentials, tokens, permissions and the request gate
//! - `storage` - Embedded identity database (redb)

pub mod api;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
