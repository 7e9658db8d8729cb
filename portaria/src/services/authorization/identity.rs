use portaria_types::Identity;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// One sign-in of an identity. Signing the same identity out and in again
/// yields a new id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignIn {
    pub id: Uuid,
    pub identity: Identity,
}

/// The signed-in identity of this process, with sign-in/sign-out events.
///
/// Reads are synchronous and cheap; lifecycle changes are observed through
/// [`CurrentIdentity::subscribe`].
#[derive(Clone, Debug)]
pub struct CurrentIdentity {
    sender: watch::Sender<Option<SignIn>>,
}

impl Default for CurrentIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentIdentity {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let current = Self::new();
        current.sign_in(identity);
        current
    }

    pub fn sign_in(&self, identity: Identity) {
        info!("Identity {} signed in with role '{}'", identity.id, identity.role);
        self.sender.send_replace(Some(SignIn {
            id: Uuid::new_v4(),
            identity,
        }));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.sender.send_replace(None) {
            info!("Identity {} signed out", previous.identity.id);
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.sender
            .borrow()
            .as_ref()
            .map(|sign_in| sign_in.identity.clone())
    }

    pub fn current_sign_in(&self) -> Option<SignIn> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SignIn>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let current = CurrentIdentity::new();
        assert!(current.current().is_none());

        current.sign_in(Identity::new("u1", "Recepcao"));
        assert_eq!(current.current().map(|i| i.id.0), Some("u1".to_string()));

        current.sign_out();
        assert!(current.current().is_none());

        // signing out twice is harmless
        current.sign_out();
        assert!(current.current().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_observe_lifecycle() {
        let current = CurrentIdentity::new();
        let mut events = current.subscribe();

        current.sign_in(Identity::new("u1", "Recepcao"));
        events.changed().await.unwrap();
        assert!(events.borrow_and_update().is_some());

        current.sign_out();
        events.changed().await.unwrap();
        assert!(events.borrow_and_update().is_none());
    }

    #[test]
    fn test_signing_in_again_is_a_new_sign_in() {
        let current = CurrentIdentity::new();
        current.sign_in(Identity::new("u1", "Recepcao"));
        let first = current.current_sign_in().unwrap();

        current.sign_out();
        current.sign_in(Identity::new("u1", "Recepcao"));
        let second = current.current_sign_in().unwrap();

        assert_eq!(first.identity, second.identity);
        assert_ne!(first.id, second.id);
    }
}
