// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only store of login attempts.

use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};

use super::database::{next_id, DbResult, LOGIN_RECORDS};
use super::AuthDatabase;
use crate::models::LoginRecord;

/// Repository for login records. Records are never updated or deleted.
pub struct LoginRecordRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> LoginRecordRepository<'a> {
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Persist a record, assigning its id.
    pub fn append(&self, mut record: LoginRecord) -> DbResult<LoginRecord> {
        let write_txn = self.db.raw().begin_write()?;
        {
            record.id = next_id(&write_txn, "login_records")?;
            let mut table = write_txn.open_table(LOGIN_RECORDS)?;
            table.insert(record.id, serde_json::to_vec(&record)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Records newest first, skipping `offset` and returning at most `limit`.
    pub fn list(&self, offset: usize, limit: usize) -> DbResult<Vec<LoginRecord>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(LOGIN_RECORDS)?;

        let mut records = Vec::with_capacity(limit);
        for entry in table.iter()?.rev().skip(offset).take(limit) {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Records for one phone number, newest first.
    pub fn list_for_phone(&self, phone: &str) -> DbResult<Vec<LoginRecord>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(LOGIN_RECORDS)?;

        let mut records = Vec::new();
        for entry in table.iter()?.rev() {
            let (_, value) = entry?;
            let record: LoginRecord = serde_json::from_slice(value.value())?;
            if record.phone == phone {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn count(&self) -> DbResult<usize> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(LOGIN_RECORDS)?;
        Ok(table.len()? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoginMethod, LoginPlatform};
    use chrono::Utc;

    fn record(phone: &str, success: bool) -> LoginRecord {
        LoginRecord {
            id: 0,
            phone: phone.to_string(),
            success,
            platform: LoginPlatform::Pc,
            method: LoginMethod::Password,
            ip: Some("127.0.0.1".to_string()),
            address: None,
            country: None,
            province: None,
            city: None,
            county: None,
            operator: None,
            postal_code: None,
            area_code: None,
            browser: None,
            os: None,
            request: "{}".to_string(),
            response: "{}".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb")).unwrap();
        let repo = LoginRecordRepository::new(&db);

        let first = repo.append(record("13800001111", false)).unwrap();
        let second = repo.append(record("13800001111", true)).unwrap();
        assert!(second.id > first.id);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn list_is_newest_first_and_paged() {
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb")).unwrap();
        let repo = LoginRecordRepository::new(&db);
        for i in 0..5 {
            repo.append(record(&format!("1380000000{i}"), true)).unwrap();
        }

        let page = repo.list(0, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].phone, "13800000004");
        assert_eq!(page[1].phone, "13800000003");

        let tail = repo.list(4, 10).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].phone, "13800000000");
    }

    #[test]
    fn list_for_phone_filters() {
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb")).unwrap();
        let repo = LoginRecordRepository::new(&db);
        repo.append(record("13800001111", false)).unwrap();
        repo.append(record("13800002222", true)).unwrap();
        repo.append(record("13800001111", true)).unwrap();

        let records = repo.list_for_phone("13800001111").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert!(!records[1].success);
    }
}
