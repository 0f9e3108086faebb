// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized User
//! - `user_phone_index`: phone → user id
//! - `roles`: role id → serialized Role
//! - `menus`: menu id → serialized Menu
//! - `login_records`: record id → serialized LoginRecord (append-only)
//! - `sequences`: table name → last assigned id
//!
//! Every operation runs inside a single redb transaction. Read transactions
//! give a consistent snapshot; a write transaction that is dropped before
//! `commit()` is rolled back, so early returns never leave partial writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;

use super::{LoginRecordRepository, PermissionCache};
use crate::models::{EntityId, LoginRecord, Menu, Role, User};

// =============================================================================
// Table Definitions
// =============================================================================

pub(super) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub(super) const USER_PHONE_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("user_phone_index");
pub(super) const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");
pub(super) const MENUS: TableDefinition<u64, &[u8]> = TableDefinition::new("menus");
pub(super) const LOGIN_RECORDS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("login_records");
pub(super) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid menu parent: {0}")]
    InvalidMenuParent(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// User Graph
// =============================================================================

/// A user with its roles and every menu reachable through them, read from a
/// single snapshot.
#[derive(Debug, Clone)]
pub struct UserGraph {
    pub user: User,
    pub roles: Vec<Role>,
    /// Menus reachable through `roles`, keyed by id. Includes disabled menus.
    pub menus: BTreeMap<EntityId, Menu>,
    /// Permission cache generation read before the snapshot was taken.
    pub cache_generation: u64,
}

impl UserGraph {
    /// Whether any held role is a super-role.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r.is_admin)
    }

    /// Role names in role order.
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID store for users, roles, menus and login records.
pub struct AuthDatabase {
    db: Database,
    permission_cache: Option<Arc<PermissionCache>>,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_PHONE_INDEX)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(MENUS)?;
            let _ = write_txn.open_table(LOGIN_RECORDS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            permission_cache: None,
        })
    }

    /// Attach the permission cache that must be invalidated on mutation.
    pub fn with_permission_cache(mut self, cache: Arc<PermissionCache>) -> Self {
        self.permission_cache = Some(cache);
        self
    }

    pub(super) fn raw(&self) -> &Database {
        &self.db
    }

    /// Verify the database can start a read transaction.
    pub fn health_check(&self) -> DbResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user, assigning its id. Phone numbers are unique.
    pub fn create_user(&self, mut user: User) -> DbResult<User> {
        let write_txn = self.db.begin_write()?;
        {
            let mut phone_idx = write_txn.open_table(USER_PHONE_INDEX)?;
            if phone_idx.get(user.phone.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!("User with phone {}", user.phone)));
            }
            ensure_all_exist(&write_txn, ROLES, &user.role_ids, "Role")?;

            user.id = next_id(&write_txn, "users")?;
            let mut users = write_txn.open_table(USERS)?;
            users.insert(user.id, to_json(&user)?.as_slice())?;
            phone_idx.insert(user.phone.as_str(), user.id)?;
        }
        write_txn.commit()?;
        Ok(user)
    }

    /// Replace an existing user.
    pub fn put_user(&self, user: &User) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let existing: User = {
                let guard = users
                    .get(user.id)?
                    .ok_or_else(|| DbError::NotFound(format!("User {}", user.id)))?;
                serde_json::from_slice(guard.value())?
            };
            ensure_all_exist(&write_txn, ROLES, &user.role_ids, "Role")?;

            let mut phone_idx = write_txn.open_table(USER_PHONE_INDEX)?;
            if existing.phone != user.phone {
                let taken = phone_idx
                    .get(user.phone.as_str())?
                    .map(|v| v.value())
                    .filter(|id| *id != user.id);
                if taken.is_some() {
                    return Err(DbError::AlreadyExists(format!("User with phone {}", user.phone)));
                }
                phone_idx.remove(existing.phone.as_str())?;
                phone_idx.insert(user.phone.as_str(), user.id)?;
            }
            users.insert(user.id, to_json(user)?.as_slice())?;
        }
        write_txn.commit()?;

        if let Some(cache) = &self.permission_cache {
            cache.invalidate(user.id);
        }
        Ok(())
    }

    /// Look up a user by id.
    pub fn get_user(&self, user_id: EntityId) -> DbResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a user by phone number.
    pub fn get_user_by_phone(&self, phone: &str) -> DbResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let phone_idx = read_txn.open_table(USER_PHONE_INDEX)?;
        let Some(user_id) = phone_idx.get(phone)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Record the last successful login. Concurrent updates: last writer wins.
    pub fn update_login_info(
        &self,
        user_id: EntityId,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut user: User = {
                let guard = users
                    .get(user_id)?
                    .ok_or_else(|| DbError::NotFound(format!("User {user_id}")))?;
                serde_json::from_slice(guard.value())?
            };
            user.last_ip = ip.map(str::to_string);
            user.last_login_at = Some(at);
            users.insert(user_id, to_json(&user)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a user together with its roles and reachable menus.
    pub fn load_user_graph(&self, user_id: EntityId) -> DbResult<Option<UserGraph>> {
        // Must be read before the snapshot; mutations invalidate after commit
        let cache_generation = self.permission_cache.as_ref().map_or(0, |c| c.generation());
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let user: User = match users.get(user_id)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };

        let roles_table = read_txn.open_table(ROLES)?;
        let mut roles = Vec::with_capacity(user.role_ids.len());
        for role_id in &user.role_ids {
            // Dangling ids are skipped rather than failing the whole request
            if let Some(value) = roles_table.get(*role_id)? {
                roles.push(serde_json::from_slice::<Role>(value.value())?);
            }
        }
        roles.sort_by_key(|r| (r.order, r.id));

        let menus_table = read_txn.open_table(MENUS)?;
        let mut menus = BTreeMap::new();
        for menu_id in roles.iter().flat_map(|r| r.menu_ids.iter()) {
            if menus.contains_key(menu_id) {
                continue;
            }
            if let Some(value) = menus_table.get(*menu_id)? {
                menus.insert(*menu_id, serde_json::from_slice::<Menu>(value.value())?);
            }
        }

        Ok(Some(UserGraph {
            user,
            roles,
            menus,
            cache_generation,
        }))
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Insert a new role, assigning its id.
    pub fn create_role(&self, mut role: Role) -> DbResult<Role> {
        let write_txn = self.db.begin_write()?;
        {
            ensure_all_exist(&write_txn, MENUS, &role.menu_ids, "Menu")?;
            role.id = next_id(&write_txn, "roles")?;
            let mut roles = write_txn.open_table(ROLES)?;
            roles.insert(role.id, to_json(&role)?.as_slice())?;
        }
        write_txn.commit()?;
        self.invalidate_all_permissions();
        Ok(role)
    }

    /// Replace an existing role.
    pub fn put_role(&self, role: &Role) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut roles = write_txn.open_table(ROLES)?;
            if roles.get(role.id)?.is_none() {
                return Err(DbError::NotFound(format!("Role {}", role.id)));
            }
            ensure_all_exist(&write_txn, MENUS, &role.menu_ids, "Menu")?;
            roles.insert(role.id, to_json(role)?.as_slice())?;
        }
        write_txn.commit()?;
        self.invalidate_all_permissions();
        Ok(())
    }

    pub fn get_role(&self, role_id: EntityId) -> DbResult<Option<Role>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ROLES)?;
        match table.get(role_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Menus
    // =========================================================================

    /// Insert a new menu, assigning its id. The parent must already exist.
    pub fn create_menu(&self, mut menu: Menu) -> DbResult<Menu> {
        let write_txn = self.db.begin_write()?;
        {
            let mut menus = write_txn.open_table(MENUS)?;
            if let Some(parent_id) = menu.parent_id {
                if menus.get(parent_id)?.is_none() {
                    return Err(DbError::InvalidMenuParent(format!(
                        "parent {parent_id} does not exist"
                    )));
                }
            }
            menu.id = next_id(&write_txn, "menus")?;
            menus.insert(menu.id, to_json(&menu)?.as_slice())?;
        }
        write_txn.commit()?;
        self.invalidate_all_permissions();
        Ok(menu)
    }

    /// Replace an existing menu. Re-parenting under itself or a descendant is rejected.
    pub fn put_menu(&self, menu: &Menu) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut menus = write_txn.open_table(MENUS)?;
            if menus.get(menu.id)?.is_none() {
                return Err(DbError::NotFound(format!("Menu {}", menu.id)));
            }

            // Walk up from the new parent; reaching this menu means a cycle
            let mut cursor = menu.parent_id;
            while let Some(ancestor_id) = cursor {
                if ancestor_id == menu.id {
                    return Err(DbError::InvalidMenuParent(format!(
                        "menu {} cannot be its own ancestor",
                        menu.id
                    )));
                }
                let ancestor: Menu = {
                    let guard = menus.get(ancestor_id)?.ok_or_else(|| {
                        DbError::InvalidMenuParent(format!("parent {ancestor_id} does not exist"))
                    })?;
                    serde_json::from_slice(guard.value())?
                };
                cursor = ancestor.parent_id;
            }

            menus.insert(menu.id, to_json(menu)?.as_slice())?;
        }
        write_txn.commit()?;
        self.invalidate_all_permissions();
        Ok(())
    }

    /// All menus ordered by id.
    pub fn list_menus(&self) -> DbResult<Vec<Menu>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MENUS)?;
        let mut menus = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            menus.push(serde_json::from_slice(value.value())?);
        }
        Ok(menus)
    }

    // =========================================================================
    // Login Records
    // =========================================================================

    /// Append a login record, assigning its id.
    pub fn append_login_record(&self, record: LoginRecord) -> DbResult<LoginRecord> {
        LoginRecordRepository::new(self).append(record)
    }

    /// Login records newest first.
    pub fn list_login_records(&self, offset: usize, limit: usize) -> DbResult<Vec<LoginRecord>> {
        LoginRecordRepository::new(self).list(offset, limit)
    }

    /// Login records for one phone number, newest first.
    pub fn login_records_for_phone(&self, phone: &str) -> DbResult<Vec<LoginRecord>> {
        LoginRecordRepository::new(self).list_for_phone(phone)
    }

    pub fn count_login_records(&self) -> DbResult<usize> {
        LoginRecordRepository::new(self).count()
    }

    pub(super) fn invalidate_all_permissions(&self) {
        if let Some(cache) = &self.permission_cache {
            cache.clear();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(super) fn to_json<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Allocate the next id for `sequence` inside the given write transaction.
pub(super) fn next_id(write_txn: &WriteTransaction, sequence: &str) -> DbResult<u64> {
    let mut seq = write_txn.open_table(SEQUENCES)?;
    let next = seq.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    seq.insert(sequence, next)?;
    Ok(next)
}

fn ensure_all_exist(
    write_txn: &WriteTransaction,
    table: TableDefinition<'static, u64, &'static [u8]>,
    ids: &BTreeSet<EntityId>,
    kind: &str,
) -> DbResult<()> {
    let table = write_txn.open_table(table)?;
    for id in ids {
        if table.get(*id)?.is_none() {
            return Err(DbError::NotFound(format!("{kind} {id}")));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MenuType;

    fn temp_db() -> (AuthDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn create_and_get_user() {
        let (db, _dir) = temp_db();
        let user = db
            .create_user(User::new("13800001111", "Alice", "hash"))
            .unwrap();
        assert_eq!(user.id, 1);

        let by_id = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(by_id.phone, "13800001111");
        let by_phone = db.get_user_by_phone("13800001111").unwrap().unwrap();
        assert_eq!(by_phone.id, user.id);
        assert!(db.get_user_by_phone("13900000000").unwrap().is_none());
    }

    #[test]
    fn phone_numbers_are_unique() {
        let (db, _dir) = temp_db();
        db.create_user(User::new("13800001111", "A", "h")).unwrap();
        let err = db.create_user(User::new("13800001111", "B", "h")).unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
    }

    #[test]
    fn put_user_moves_phone_index() {
        let (db, _dir) = temp_db();
        let mut user = db.create_user(User::new("13800001111", "A", "h")).unwrap();
        user.phone = "13800002222".to_string();
        db.put_user(&user).unwrap();

        assert!(db.get_user_by_phone("13800001111").unwrap().is_none());
        assert_eq!(db.get_user_by_phone("13800002222").unwrap().unwrap().id, user.id);
    }

    #[test]
    fn user_roles_must_exist() {
        let (db, _dir) = temp_db();
        let mut user = User::new("13800001111", "A", "h");
        user.role_ids.insert(42);
        assert!(matches!(db.create_user(user), Err(DbError::NotFound(_))));
    }

    #[test]
    fn update_login_info_sets_ip_and_time() {
        let (db, _dir) = temp_db();
        let user = db.create_user(User::new("13800001111", "A", "h")).unwrap();
        let at = Utc::now();
        db.update_login_info(user.id, Some("10.0.0.1"), at).unwrap();

        let user = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(user.last_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(user.last_login_at, Some(at));
    }

    #[test]
    fn menu_parent_must_exist() {
        let (db, _dir) = temp_db();
        let orphan = Menu::new("Orphan", "orphan", MenuType::Page).with_parent(99);
        assert!(matches!(db.create_menu(orphan), Err(DbError::InvalidMenuParent(_))));
    }

    #[test]
    fn menu_cycles_are_rejected() {
        let (db, _dir) = temp_db();
        let root = db.create_menu(Menu::new("Root", "root", MenuType::Directory)).unwrap();
        let child = db
            .create_menu(Menu::new("Child", "child", MenuType::Page).with_parent(root.id))
            .unwrap();

        let mut looped = root.clone();
        looped.parent_id = Some(child.id);
        assert!(matches!(db.put_menu(&looped), Err(DbError::InvalidMenuParent(_))));

        let mut own_parent = child.clone();
        own_parent.parent_id = Some(child.id);
        assert!(matches!(db.put_menu(&own_parent), Err(DbError::InvalidMenuParent(_))));
    }

    #[test]
    fn load_user_graph_collects_roles_and_menus() {
        let (db, _dir) = temp_db();
        let docs = db
            .create_menu(Menu::new("Docs", "docs", MenuType::Page).with_perms("doc.edit"))
            .unwrap();
        let reports = db
            .create_menu(Menu::new("Reports", "reports", MenuType::Page).with_perms("report.view"))
            .unwrap();

        let mut editor = Role::new("editor", "Editor");
        editor.menu_ids.insert(docs.id);
        let editor = db.create_role(editor).unwrap();
        let mut viewer = Role::new("viewer", "Viewer");
        viewer.menu_ids.extend([docs.id, reports.id]);
        let viewer = db.create_role(viewer).unwrap();

        let mut user = User::new("13800001111", "A", "h");
        user.role_ids.extend([editor.id, viewer.id]);
        let user = db.create_user(user).unwrap();

        let graph = db.load_user_graph(user.id).unwrap().unwrap();
        assert_eq!(graph.roles.len(), 2);
        assert_eq!(graph.menus.len(), 2);
        assert!(!graph.is_admin());
        assert_eq!(graph.role_names(), vec!["Editor", "Viewer"]);

        assert!(db.load_user_graph(999).unwrap().is_none());
    }

    #[test]
    fn list_menus_returns_all() {
        let (db, _dir) = temp_db();
        db.create_menu(Menu::new("A", "a", MenuType::Directory)).unwrap();
        db.create_menu(Menu::new("B", "b", MenuType::Action)).unwrap();
        assert_eq!(db.list_menus().unwrap().len(), 2);
    }

    #[test]
    fn role_mutation_clears_permission_cache() {
        let cache = Arc::new(PermissionCache::new(16, std::time::Duration::from_secs(60)));
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb"))
            .unwrap()
            .with_permission_cache(cache.clone());

        cache.put(7, crate::auth::PermissionSet::All, cache.generation());
        assert!(cache.get(7).is_some());

        db.create_role(Role::new("r", "R")).unwrap();
        assert!(cache.get(7).is_none());
    }
}
