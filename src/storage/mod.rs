// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent identity data in an embedded redb database.
//!
//! ## Layout
//!
//! ```text
//! $DATA_DIR/
//!   auth.redb
//!     users             # user id -> User (role ids inline)
//!     user_phone_index  # phone -> user id
//!     roles             # role id -> Role (menu ids inline)
//!     menus             # menu id -> Menu (parent id inline)
//!     login_records     # record id -> LoginRecord, append-only
//!     sequences         # table name -> last id
//! ```
//!
//! Relationships are id sets resolved by lookups inside one transaction;
//! there are no live back-references between entities.

pub mod database;
pub mod login_records;
pub mod permission_cache;
pub mod seed;

pub use database::{AuthDatabase, DbError, DbResult, UserGraph};
pub use login_records::LoginRecordRepository;
pub use permission_cache::PermissionCache;
pub use seed::{seed_admin, SeedError};
