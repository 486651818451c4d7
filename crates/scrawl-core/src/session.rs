//! Authenticated session handed to the facade and the sync engine.

use std::fmt;

use crate::models::OwnerId;

/// Identity of the signed-in user plus the opaque token for the remote.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub owner_id: OwnerId,
    pub access_token: Option<String>,
}

impl Session {
    pub const fn new(owner_id: OwnerId, access_token: Option<String>) -> Self {
        Self {
            owner_id,
            access_token,
        }
    }

    /// Session without a token, for purely local use.
    pub const fn local(owner_id: OwnerId) -> Self {
        Self::new(owner_id, None)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("owner_id", &self.owner_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
