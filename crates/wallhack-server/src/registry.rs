//! Per-identity session registry.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Maps a client identity (certificate common name) to the cancellation
/// handle of the session currently bridging for it.
///
/// At most one session is active per identity: installing a new handle
/// cancels and replaces any prior one in a single critical section, so a
/// reconnecting client deterministically reclaims its TUN from a half-dead
/// predecessor. Sessions do not remove themselves on exit; a successor
/// overwrites the entry, and a cancelled leftover handle is inert.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, CancellationToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `session` as the active handle for `identity`, cancelling
    /// whichever session held the identity before.
    pub fn supersede(&self, identity: &str, session: CancellationToken) {
        let mut sessions = self.sessions.lock();
        if let Some(prior) = sessions.insert(identity.to_owned(), session) {
            prior.cancel();
        }
    }
}
