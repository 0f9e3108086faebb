// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Phone/password verification.

use std::sync::LazyLock;

use regex::Regex;

use super::password::PasswordHasher;
use super::AuthError;
use crate::models::User;
use crate::storage::AuthDatabase;

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^1(3\d|4[4-9]|5[0-35-9]|6[67]|7[013-8]|8\d|9\d)\d{8}$")
        .expect("phone pattern is a valid regex")
});

/// Whether `phone` is a mainland China mobile number.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Check a phone/password pair and the account gates.
///
/// Checks run in a fixed order: account exists, password matches, account
/// is active, and (when `require_staff`) account is staff. Has no side
/// effects; login bookkeeping is the caller's job.
///
/// Blocking: performs a redb read and an Argon2 verification.
pub fn authenticate(
    db: &AuthDatabase,
    hasher: &dyn PasswordHasher,
    phone: &str,
    password: &str,
    require_staff: bool,
) -> Result<User, AuthError> {
    let user = db.get_user_by_phone(phone)?.ok_or(AuthError::NotFound)?;

    if !hasher.verify(password, &user.password_hash) {
        return Err(AuthError::InvalidCredential);
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled);
    }
    if require_staff && !user.is_staff {
        return Err(AuthError::NotStaff);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::test_hasher;

    fn db_with_user(configure: impl FnOnce(&mut User)) -> (AuthDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = AuthDatabase::open(&dir.path().join("test.redb")).unwrap();
        let hash = test_hasher().hash("Secret123").unwrap();
        let mut user = User::new("13800001111", "Alice", hash);
        user.is_staff = true;
        configure(&mut user);
        db.create_user(user).unwrap();
        (db, dir)
    }

    #[test]
    fn accepts_matching_credentials() {
        let (db, _dir) = db_with_user(|_| {});
        let user = authenticate(&db, &test_hasher(), "13800001111", "Secret123", true).unwrap();
        assert_eq!(user.name, "Alice");
        assert!(user.last_login_at.is_none());
    }

    #[test]
    fn unknown_phone_is_not_found() {
        let (db, _dir) = db_with_user(|_| {});
        let err = authenticate(&db, &test_hasher(), "13900000000", "Secret123", true).unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[test]
    fn wrong_password_is_invalid_credential() {
        let (db, _dir) = db_with_user(|_| {});
        let err = authenticate(&db, &test_hasher(), "13800001111", "secret123", true).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }

    #[test]
    fn password_is_checked_before_active_flag() {
        let (db, _dir) = db_with_user(|u| u.is_active = false);
        let wrong = authenticate(&db, &test_hasher(), "13800001111", "nope", true).unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredential));

        let right = authenticate(&db, &test_hasher(), "13800001111", "Secret123", true).unwrap_err();
        assert!(matches!(right, AuthError::AccountDisabled));
    }

    #[test]
    fn staff_gate_applies_only_when_required() {
        let (db, _dir) = db_with_user(|u| u.is_staff = false);
        let err = authenticate(&db, &test_hasher(), "13800001111", "Secret123", true).unwrap_err();
        assert!(matches!(err, AuthError::NotStaff));
        assert!(authenticate(&db, &test_hasher(), "13800001111", "Secret123", false).is_ok());
    }

    #[test]
    fn phone_pattern() {
        assert!(is_valid_phone("13800001111"));
        assert!(is_valid_phone("19912345678"));
        assert!(!is_valid_phone("12800001111"));
        assert!(!is_valid_phone("1380000111"));
        assert!(!is_valid_phone("138000011112"));
        assert!(!is_valid_phone("1380000111a"));
    }
}
