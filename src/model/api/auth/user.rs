use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::common::Role;

/// The rights a token can represent. Serialized compactly into the JWT.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl From<Role> for Rights {
    fn from(role: Role) -> Self {
        match role {
            Role::Voter => Self::Voter,
            Role::Admin => Self::Admin,
        }
    }
}

impl From<Rights> for Role {
    fn from(rights: Rights) -> Self {
        match rights {
            Rights::Voter => Self::Voter,
            Rights::Admin => Self::Admin,
        }
    }
}

/// A type of user, with associated rights. Implemented by marker types so
/// that route signatures state the rights they require.
pub trait User {
    const RIGHTS: Rights;
}

/// Marker for voter-rights tokens.
pub struct Voter;

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

/// Marker for admin-rights tokens.
pub struct Admin;

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
