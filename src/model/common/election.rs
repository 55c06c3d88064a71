use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// The state is set by admins and is authoritative over the start/end
/// timestamps: an election whose timestamps would allow voting still rejects
/// ballots unless its state is `Active`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionState {
    /// Under construction or paused; not accepting votes.
    Inactive,
    /// Open for voting.
    Active,
    /// Finished; results remain queryable.
    Completed,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
