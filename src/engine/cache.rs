//! Process-wide cache of the query engine.
//!
//! The first request to find the cache empty claims initialization; every
//! request arriving meanwhile waits for that outcome instead of starting a
//! second introspection.
//!
//! ## Invariants
//! - At most one initialization runs at a time.
//! - Once `Ready`, the engine is handed out unchanged until [`SchemaCache::reset`].
//! - An initialization that is dropped midway puts the cache back to
//!   `Uninitialized` so a later request can start over.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::errors::{EngineError, EngineResult};
use super::{Engine, EngineLoader};
use crate::observability::Event;

#[derive(Clone)]
enum EngineState {
    Uninitialized,
    Initializing,
    Ready(Arc<Engine>),
    Failed(Arc<str>),
}

/// Lazily initialized engine shared by all requests
pub struct SchemaCache {
    state: watch::Sender<EngineState>,
    loader: Arc<dyn EngineLoader>,
}

impl SchemaCache {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self { state, loader }
    }

    /// Return the engine, initializing it if no one has yet.
    ///
    /// A caller that waited on someone else's initialization and saw it fail
    /// gets [`EngineError::Unavailable`]; the next fresh call tries again.
    pub async fn ensure_ready(&self) -> EngineResult<Arc<Engine>> {
        let mut waited = false;
        loop {
            let mut observer = self.state.subscribe();
            let snapshot = observer.borrow_and_update().clone();

            match snapshot {
                EngineState::Ready(engine) => return Ok(engine),
                EngineState::Failed(reason) if waited => {
                    return Err(EngineError::Unavailable(reason.to_string()))
                }
                EngineState::Initializing => {
                    waited = true;
                    // the sender lives in self, so this only returns on a change
                    let _ = observer.changed().await;
                }
                EngineState::Uninitialized | EngineState::Failed(_) => {
                    if self.claim() {
                        return self.initialize().await;
                    }
                }
            }
        }
    }

    /// The engine, if initialization already succeeded
    pub fn current(&self) -> Option<Arc<Engine>> {
        match &*self.state.borrow() {
            EngineState::Ready(engine) => Some(engine.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Drop a ready engine so the next request introspects again. Has no
    /// effect while an initialization is running.
    pub fn reset(&self) {
        let cleared = self.state.send_if_modified(|state| match state {
            EngineState::Ready(_) | EngineState::Failed(_) => {
                *state = EngineState::Uninitialized;
                true
            }
            _ => false,
        });
        if cleared {
            info!(event = Event::EngineReset.as_str(), "Query engine reset");
        }
    }

    fn claim(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            EngineState::Uninitialized | EngineState::Failed(_) => {
                *state = EngineState::Initializing;
                true
            }
            _ => false,
        })
    }

    async fn initialize(&self) -> EngineResult<Arc<Engine>> {
        let mut guard = InitGuard {
            state: &self.state,
            armed: true,
        };
        let outcome = self.loader.load().await;
        guard.armed = false;

        match outcome {
            Ok(engine) => {
                let engine = Arc::new(engine);
                self.state.send_replace(EngineState::Ready(engine.clone()));
                info!(event = Event::EngineReady.as_str(), "Query engine ready");
                Ok(engine)
            }
            Err(err) => {
                self.state
                    .send_replace(EngineState::Failed(Arc::from(err.to_string())));
                Err(err)
            }
        }
    }
}

// Resets the state if the initializing future is dropped before finishing.
struct InitGuard<'a> {
    state: &'a watch::Sender<EngineState>,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(EngineState::Uninitialized);
        }
    }
}
