//! Shared state for the auth handlers.

use std::sync::Arc;

use crate::identity::IdentityBinder;
use crate::session::SessionEngine;

/// Engine plus identity binder, shared via an axum `Extension`.
pub struct AuthState {
    engine: SessionEngine,
    identity: Arc<dyn IdentityBinder>,
}

impl AuthState {
    #[must_use]
    pub fn new(engine: SessionEngine, identity: Arc<dyn IdentityBinder>) -> Self {
        Self { engine, identity }
    }

    #[must_use]
    pub const fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityBinder {
        self.identity.as_ref()
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
