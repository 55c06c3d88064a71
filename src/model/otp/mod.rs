mod code;

pub use code::{Code, CODE_LENGTH};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// An issued OTP challenge, stored on the unverified user's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp {
    pub code: Code,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
}

impl Otp {
    /// Issue a fresh random challenge with the configured TTL.
    pub fn issue(config: &Config) -> Self {
        Self {
            code: Code::random(),
            expire_at: Utc::now() + config.otp_ttl(),
        }
    }

    /// Does the given code match, within the validity window?
    pub fn accepts(&self, code: Code) -> bool {
        self.code == code && Utc::now() <= self.expire_at
    }
}
