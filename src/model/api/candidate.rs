use serde::{Deserialize, Serialize};

use crate::model::{
    db::candidate::Candidate,
    mongodb::{serde_string_id, Id},
};

/// Specification for adding a candidate to an election.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub party: Option<String>,
}

/// Request to add a candidate to an election.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCandidateRequest {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    #[serde(flatten)]
    pub spec: CandidateSpec,
}

/// Partial update to a candidate. Absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateUpdate {
    pub name: Option<String>,
    pub party: Option<String>,
}

/// A candidate as presented to voters. Deliberately omits the vote count,
/// which is only exposed via the tally endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    #[serde(with = "serde_string_id")]
    pub id: Id,
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            election_id: candidate.candidate.election_id,
            name: candidate.candidate.name,
            party: candidate.candidate.party,
        }
    }
}

/// A candidate with their current vote count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    #[serde(with = "serde_string_id")]
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    pub vote_count: u64,
}

impl From<Candidate> for CandidateTally {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            vote_count: candidate.candidate.vote_count,
        }
    }
}
