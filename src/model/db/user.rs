use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use mongodb::{error::Error as DbError, Database};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::model::{common::Role, mongodb::Coll, otp::Otp};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The bootstrap admin account, created at ignition if no admin exists.
/// The password must be changed after first login.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@votesecure.org";
pub const DEFAULT_ADMIN_PASSWORD: &str = "password123";

/// Core user data, as stored in the database.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    /// Stored trimmed and lowercased; unique index enforced.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    /// Set once the email address has been proven via OTP.
    pub verified: bool,
    /// Outstanding OTP challenge, present only while unverified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<Otp>,
    /// Outstanding password-reset token digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<ResetToken>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Create a new unverified voter-or-admin account, hashing the password.
    pub fn new(name: String, email: &str, password: &str, role: Role, otp: Option<Otp>) -> Self {
        Self {
            name,
            email: normalise_email(email),
            password_hash: hash_password(password),
            role,
            verified: false,
            otp,
            reset_token: None,
            created_at: Utc::now(),
        }
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because we only ever store hashes produced by
        // `hash_password`, so the encoding is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: crate::model::mongodb::Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// An issued password-reset token. Only the SHA-256 digest of the token is
/// stored; the plaintext goes out by email and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    pub token_hash: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
}

impl ResetToken {
    /// Issue a fresh token. Returns the plaintext to email out alongside
    /// the digest record to store.
    pub fn issue(config: &Config) -> (String, Self) {
        let mut bytes = [0_u8; 20];
        rand::thread_rng().fill(&mut bytes);
        let token = HEXLOWER.encode(&bytes);
        let record = Self {
            token_hash: digest(&token),
            expire_at: Utc::now() + config.reset_ttl(),
        };
        (token, record)
    }

    /// Does the given plaintext token match, within the validity window?
    pub fn accepts(&self, token: &str) -> bool {
        self.token_hash == digest(token) && Utc::now() <= self.expire_at
    }
}

/// Hex-encoded SHA-256 digest of a reset token.
pub fn digest(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}

/// Hash a password with a random salt.
pub fn hash_password(password: &str) -> String {
    // 16 bytes of salt is the recommendation for argon2.
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
        .expect("hashing with the default config is infallible")
}

/// Normalise an email address for storage and lookup: addresses are
/// case-insensitively unique.
pub fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Ensure at least one admin account exists, seeding the default one if not.
///
/// This operation is idempotent.
pub async fn ensure_default_admin(db: &Database) -> Result<(), DbError> {
    let users = Coll::<User>::from_db(db);
    let existing_admin = users.find_one(doc! { "role": Role::Admin }, None).await?;
    if existing_admin.is_none() {
        let mut admin = NewUser::new(
            "Admin User".to_string(),
            DEFAULT_ADMIN_EMAIL,
            DEFAULT_ADMIN_PASSWORD,
            Role::Admin,
            None,
        );
        // Admins do not go through email verification.
        admin.verified = true;
        Coll::<NewUser>::from_db(db).insert_one(admin, None).await?;
        warn!("Seeded default admin {DEFAULT_ADMIN_EMAIL}; change its password");
    }
    Ok(())
}
