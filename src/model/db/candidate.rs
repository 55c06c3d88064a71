use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{api::candidate::CandidateSpec, mongodb::Id};

/// Core candidate data, as stored in the database.
///
/// The `vote_count` is the live tally for this candidate. It is only ever
/// modified by an atomic `$inc` inside the vote-casting transaction, so it
/// always equals the number of vote documents referencing this candidate.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateCore {
    pub election_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    pub vote_count: u64,
}

impl CandidateCore {
    /// Create a new candidate for the given election, starting at zero votes.
    pub fn new(election_id: Id, spec: CandidateSpec) -> Self {
        Self {
            election_id,
            name: spec.name,
            party: spec.party,
            vote_count: 0,
        }
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}
