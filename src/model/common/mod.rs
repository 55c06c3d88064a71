//! Types shared between the DB and API representations.

mod election;
mod user;

pub use election::ElectionState;
pub use user::Role;
