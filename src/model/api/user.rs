use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    common::Role,
    db::user::User,
    mongodb::{serde_string_id, Id},
};

/// An account as presented over the API. Never includes the password hash
/// or any outstanding OTP or reset token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDescription {
    #[serde(with = "serde_string_id")]
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDescription {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.user.name,
            email: user.user.email,
            role: user.user.role,
            verified: user.user.verified,
            created_at: user.user.created_at,
        }
    }
}
