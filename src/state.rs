use std::sync::Arc;

use crate::config::Config;
use crate::store::TicketStore;
use crate::tickets::{IssuanceCoordinator, TicketGenerator, VerificationService};

/// Shared handler state, cloned per request.
pub struct AppState<S> {
    pub store: S,
    pub issuer: Arc<IssuanceCoordinator<S>>,
    pub verifier: Arc<VerificationService<S>>,
}

impl<S> Clone for AppState<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            issuer: Arc::clone(&self.issuer),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<S: TicketStore> AppState<S> {
    /// Wires the generator, issuer and verifier around one store and key.
    pub fn new(store: S, config: &Config) -> Self {
        let generator = TicketGenerator::new(Arc::clone(&config.signer));
        let issuer = IssuanceCoordinator::new(store.clone(), generator)
            .with_max_attempts(config.max_issue_attempts);
        let verifier = VerificationService::new(store.clone(), Arc::clone(&config.signer));

        Self {
            store,
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
        }
    }
}
