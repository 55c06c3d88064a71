//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
///
/// This is how a concurrent duplicate cast that races past the pre-check
/// announces itself: the unique index on (voter, election) rejects the
/// insert with this code.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    // Inside a transaction the write error surfaces as a command error.
    if let ErrorKind::Command(ref e) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}
