// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! First-start bootstrap of a super-admin account.

use crate::auth::password::{PasswordError, PasswordHasher};
use crate::models::{Menu, MenuType, Role, User};

use super::database::{next_id, to_json, MENUS, ROLES, USERS, USER_PHONE_INDEX};
use redb::ReadableTable;

use super::{AuthDatabase, DbError};

/// Permission gating the login-record listing.
pub const LOGIN_RECORD_LIST_PERM: &str = "system.login_record.list";

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Create the system menus, an `admin` super-role and a staff user holding it.
///
/// Does nothing when a user with `phone` already exists. Everything is written
/// in one transaction, so a failed seed leaves no menus or roles behind.
/// Returns whether anything was created.
pub fn seed_admin(
    db: &AuthDatabase,
    hasher: &dyn PasswordHasher,
    phone: &str,
    password: &str,
) -> Result<bool, SeedError> {
    if db.get_user_by_phone(phone)?.is_some() {
        return Ok(false);
    }
    let password_hash = hasher.hash(password)?;

    let write_txn = db.raw().begin_write().map_err(DbError::from)?;
    let user = {
        let mut phone_idx = write_txn.open_table(USER_PHONE_INDEX).map_err(DbError::from)?;
        if phone_idx.get(phone).map_err(DbError::from)?.is_some() {
            return Ok(false);
        }

        let mut system = Menu::new("System", "System", MenuType::Directory)
            .with_path("/system", "LAYOUT")
            .with_order(100);
        system.id = next_id(&write_txn, "menus")?;
        let mut records = Menu::new("Login Records", "LoginRecords", MenuType::Page)
            .with_parent(system.id)
            .with_path("/system/login-records", "/system/login-records/index")
            .with_perms(LOGIN_RECORD_LIST_PERM)
            .with_order(1);
        records.id = next_id(&write_txn, "menus")?;

        let mut role = Role::new("admin", "Administrator");
        role.is_admin = true;
        role.menu_ids.extend([system.id, records.id]);
        role.id = next_id(&write_txn, "roles")?;

        let mut user = User::new(phone, "Administrator", password_hash);
        user.is_staff = true;
        user.role_ids.insert(role.id);
        user.id = next_id(&write_txn, "users")?;

        let mut menus = write_txn.open_table(MENUS).map_err(DbError::from)?;
        for menu in [&system, &records] {
            menus.insert(menu.id, to_json(menu)?.as_slice()).map_err(DbError::from)?;
        }
        let mut roles = write_txn.open_table(ROLES).map_err(DbError::from)?;
        roles.insert(role.id, to_json(&role)?.as_slice()).map_err(DbError::from)?;
        let mut users = write_txn.open_table(USERS).map_err(DbError::from)?;
        users.insert(user.id, to_json(&user)?.as_slice()).map_err(DbError::from)?;
        phone_idx.insert(phone, user.id).map_err(DbError::from)?;
        user
    };
    write_txn.commit().map_err(DbError::from)?;
    db.invalidate_all_permissions();

    tracing::info!(user_id = user.id, phone = %phone, "Seeded super-admin account");
    Ok(true)
}
