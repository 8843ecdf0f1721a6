//! Signed-in identity source.

use crate::model::OwnerId;

/// Supplies the current user identity, or `None` when signed out.
pub trait Session {
    fn current_identity(&self) -> Option<OwnerId>;
}

/// A session whose identity is set explicitly by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    identity: Option<OwnerId>,
}

impl StaticSession {
    #[must_use]
    pub fn signed_in(owner: impl Into<OwnerId>) -> Self {
        Self {
            identity: Some(owner.into()),
        }
    }

    pub fn sign_in(&mut self, owner: impl Into<OwnerId>) {
        self.identity = Some(owner.into());
    }

    pub fn sign_out(&mut self) {
        self.identity = None;
    }
}

impl Session for StaticSession {
    fn current_identity(&self) -> Option<OwnerId> {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_out_clears_identity() {
        let mut session = StaticSession::signed_in("uid-1");
        assert_eq!(session.current_identity(), Some(OwnerId::new("uid-1")));
        session.sign_out();
        assert!(session.current_identity().is_none());
    }
}
