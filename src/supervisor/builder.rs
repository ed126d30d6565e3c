//! Builder for [`Supervisor`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::middleware::MiddlewareRegistry;
use crate::session::{EmitTap, LiveSession};
use crate::transport::{Timer, TokioTimer};

use super::behavior::Behavior;
use super::core::{Supervisor, SupervisorCore, run_worker};
use super::keepalive::{KeepAlive, KeepAliveConfig};
use super::reconnect::{ReconnectConfig, ReconnectionPolicy};
use super::turns::{TurnConfig, TurnCounter};

// ============================================================================
// SupervisorBuilder
// ============================================================================

/// Configures and attaches a [`Supervisor`].
///
/// Use [`Supervisor::builder()`] to create one. Built-in behaviors run in a
/// fixed order (reconnection, turns, keep-alive), followed by custom
/// behaviors in the order they were added.
pub struct SupervisorBuilder {
    session: LiveSession,
    registry: Arc<MiddlewareRegistry>,
    timer: Option<Arc<dyn Timer>>,
    reconnection: Option<ReconnectConfig>,
    turns: Option<TurnConfig>,
    keep_alive: Option<KeepAliveConfig>,
    behaviors: Vec<Arc<dyn Behavior>>,
}

impl SupervisorBuilder {
    /// Creates a builder with no behaviors.
    #[must_use]
    pub fn new(session: LiveSession, registry: Arc<MiddlewareRegistry>) -> Self {
        Self {
            session,
            registry,
            timer: None,
            reconnection: None,
            turns: None,
            keep_alive: None,
            behaviors: Vec::new(),
        }
    }

    /// Enables automatic reconnection.
    #[must_use]
    pub fn with_reconnection(mut self, config: ReconnectConfig) -> Self {
        self.reconnection = Some(config);
        self
    }

    /// Enables turn counting.
    #[must_use]
    pub fn with_turn_counting(mut self, config: TurnConfig) -> Self {
        self.turns = Some(config);
        self
    }

    /// Enables periodic keep-alive messages.
    #[must_use]
    pub fn with_keep_alive(mut self, config: KeepAliveConfig) -> Self {
        self.keep_alive = Some(config);
        self
    }

    /// Adds a custom behavior.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Arc<dyn Behavior>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Sets the timer used by built-in behaviors. Defaults to [`TokioTimer`].
    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Attaches the supervisor to the session.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] outside a tokio runtime
    /// - [`Error::AlreadySupervised`] if the session already has a supervisor
    pub fn build(self) -> Result<Supervisor> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::config(format!("Supervisor requires a tokio runtime: {e}")))?;

        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(TokioTimer::new()) as Arc<dyn Timer>);

        let mut behaviors: Vec<Arc<dyn Behavior>> = Vec::new();

        let reconnection = self
            .reconnection
            .map(|config| ReconnectionPolicy::new(config, Arc::clone(&timer)));
        if let Some(policy) = &reconnection {
            behaviors.push(Arc::new(policy.clone()));
        }

        let turns = self.turns.map(|config| Arc::new(TurnCounter::new(config)));
        if let Some(counter) = &turns {
            behaviors.push(Arc::clone(counter) as Arc<dyn Behavior>);
        }

        if let Some(config) = self.keep_alive {
            behaviors.push(Arc::new(KeepAlive::new(config, Arc::clone(&timer))));
        }

        behaviors.extend(self.behaviors);

        let session_id = self.session.id();
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let released = Arc::new(AtomicBool::new(true));

        let core = Arc::new(SupervisorCore {
            session: self.session.clone(),
            registry: Arc::clone(&self.registry),
            behaviors,
            reconnection,
            turns,
            last_metadata: Mutex::new(None),
            jobs_tx,
            released: Arc::clone(&released),
        });

        let tap: Arc<dyn EmitTap> = core.clone();
        self.session.install_tap(Arc::downgrade(&tap))?;
        released.store(false, Ordering::Release);

        runtime.spawn(run_worker(
            self.session.downgrade(),
            session_id,
            self.registry,
            released,
            jobs_rx,
        ));

        debug!(
            %session_id,
            behaviors = core.behaviors.len(),
            "Supervisor attached"
        );

        Ok(Supervisor { core })
    }
}

impl fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("session", &self.session.id())
            .field("reconnection", &self.reconnection)
            .field("turns", &self.turns)
            .field("keep_alive", &self.keep_alive)
            .field("behaviors", &self.behaviors.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::{Namespace, ProtocolVersion, SessionEvent};
    use crate::testing::{FakeSocketFactory, fake_session};

    struct Named;

    impl Behavior for Named {
        fn name(&self) -> &'static str {
            "named"
        }

        fn observe(&self, _: &LiveSession, _: &SessionEvent, _: &mut Vec<SessionEvent>) {}
    }

    #[tokio::test]
    async fn test_behavior_order() {
        let factory = FakeSocketFactory::new();
        let session = fake_session(&factory, Namespace::Agent, ProtocolVersion::V1);

        let supervisor = Supervisor::builder(session, MiddlewareRegistry::shared())
            .with_behavior(Arc::new(Named))
            .with_keep_alive(KeepAliveConfig::default())
            .with_turn_counting(TurnConfig::default())
            .with_reconnection(ReconnectConfig::default())
            .build()
            .expect("supervisor");

        let names: Vec<&str> = supervisor.core.behaviors.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["reconnection", "turns", "keep_alive", "named"]);
        assert!(!supervisor.is_released());
        assert_eq!(supervisor.turn_count(), Some(0));
    }

    #[test]
    fn test_build_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let factory = FakeSocketFactory::new();
        let session = runtime.block_on(async {
            fake_session(&factory, Namespace::Listen, ProtocolVersion::V1)
        });

        let result = Supervisor::builder(session, MiddlewareRegistry::shared()).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
