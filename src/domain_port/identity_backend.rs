use crate::domain_model::{Session, SessionEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no session to refresh")]
    NoSession,
    #[error("identity backend rejected the request: {0}")]
    Rejected(String),
    #[error("identity transport error: {0}")]
    Transport(String),
    #[error("identity response decode error: {0}")]
    InvalidResponse(String),
}

/// Receives session-change notifications in the order the backend emits them.
pub trait SessionChangeHandler: Send + Sync {
    fn on_session_change(&self, event: SessionEvent, session: Option<&Session>);
}

/// Handle returned by [`IdentityBackend::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, IdentityError>;
    async fn refresh_session(&self) -> Result<Session, IdentityError>;
    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, IdentityError>;
    async fn sign_out(&self) -> Result<(), IdentityError>;
    fn subscribe(&self, handler: Arc<dyn SessionChangeHandler>) -> Subscription;
}

type HandlerList = Vec<(u64, Arc<dyn SessionChangeHandler>)>;

/// Fan-out list shared by identity backend adapters.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    handlers: Arc<Mutex<HandlerList>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Arc<dyn SessionChangeHandler>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push((id, handler));
        }
        let handlers = self.handlers.clone();
        Subscription::new(move || {
            if let Ok(mut handlers) = handlers.lock() {
                handlers.retain(|(existing, _)| *existing != id);
            }
        })
    }

    pub fn notify(&self, event: SessionEvent, session: Option<&Session>) {
        // snapshot first so a handler may unsubscribe from inside the callback
        let handlers: Vec<_> = match self.handlers.lock() {
            Ok(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            Err(_) => return,
        };
        for handler in handlers {
            handler.on_session_change(event, session);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<SessionEvent>>);

    impl SessionChangeHandler for Recorder {
        fn on_session_change(&self, event: SessionEvent, _session: Option<&Session>) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn events_arrive_in_delivery_order_until_unsubscribed() {
        let registry = SubscriberRegistry::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let subscription = registry.subscribe(recorder.clone());

        registry.notify(SessionEvent::SignedIn, None);
        registry.notify(SessionEvent::TokenRefreshed, None);
        subscription.unsubscribe();
        registry.notify(SessionEvent::SignedOut, None);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![SessionEvent::SignedIn, SessionEvent::TokenRefreshed]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let registry = SubscriberRegistry::new();
        {
            let _subscription = registry.subscribe(Arc::new(Recorder(Mutex::new(Vec::new()))));
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }
}
