pub mod auth;
pub mod candidate;
pub mod election;
pub mod user;
pub mod vote;
