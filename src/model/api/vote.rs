use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::vote::VoteCore,
    mongodb::{serde_string_id, Id},
};

/// Specification for casting a vote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSpec {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    #[serde(with = "serde_string_id")]
    pub candidate_id: Id,
}

/// Confirmation of a successfully cast vote.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    #[serde(with = "serde_string_id")]
    pub candidate_id: Id,
    pub cast_at: DateTime<Utc>,
}

impl From<&VoteCore> for VoteReceipt {
    fn from(vote: &VoteCore) -> Self {
        Self {
            election_id: vote.election_id,
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}

/// One entry in a voter's own voting history. The voter may see their own
/// choices, so the candidate is included here.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteHistoryEntry {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    pub election_title: Option<String>,
    pub candidate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_party: Option<String>,
    pub cast_at: DateTime<Utc>,
}

/// One entry in the admin audit log.
///
/// Deliberately carries no candidate information in any form: the audit log
/// proves who voted and when, never what for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    pub election_title: Option<String>,
    pub voter_name: Option<String>,
    pub voter_email: Option<String>,
    pub cast_at: DateTime<Utc>,
}
