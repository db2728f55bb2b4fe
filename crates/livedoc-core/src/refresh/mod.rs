//! Refresh coordination.
//!
//! At most one user-module load runs at a time. Requests arriving while a
//! load is in flight share its result and mark a trailing run; when the
//! in-flight load completes exactly one more run starts, however many
//! requests arrived in between. Every completed run publishes its registry
//! into the root scope and bumps the render generation, successful or not.
//!
//! Whichever run completes last is the one published.

mod auto;
mod debounce;

pub use auto::{should_auto_refresh_for_path, AutoRefresh, StorageEvent};
pub use debounce::Debouncer;

use crate::loader::{LoadOutcome, LoadTrigger, ModuleHost, ModuleLoader};
use crate::scope::Scope;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Anything that can produce the user module's exports.
pub trait UserModuleSource: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn load(&self, trigger: LoadTrigger) -> BoxFuture<'_, LoadOutcome<Self::Value>>;
}

impl<H: ModuleHost + 'static> UserModuleSource for ModuleLoader<H> {
    type Value = H::Value;

    fn load(&self, trigger: LoadTrigger) -> BoxFuture<'_, LoadOutcome<H::Value>> {
        Box::pin(self.load_user_module(trigger))
    }
}

type SharedRun = Shared<BoxFuture<'static, bool>>;

#[derive(Default)]
struct Session {
    in_flight: Option<SharedRun>,
    /// Trigger of the latest request that arrived during the in-flight run.
    pending: Option<LoadTrigger>,
    last_ok: bool,
    completed: u64,
}

struct Inner<S: UserModuleSource> {
    source: Arc<S>,
    root: Scope<S::Value>,
    session: Mutex<Session>,
    renders: watch::Sender<u64>,
}

impl<S: UserModuleSource> Inner<S> {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializes user-module loads and publishes their results.
pub struct RefreshCoordinator<S: UserModuleSource> {
    inner: Arc<Inner<S>>,
}

impl<S: UserModuleSource> Clone for RefreshCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: UserModuleSource> RefreshCoordinator<S> {
    /// Coordinator publishing into `root`.
    pub fn new(source: Arc<S>, root: Scope<S::Value>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                root,
                session: Mutex::new(Session::default()),
                renders: watch::channel(0).0,
            }),
        }
    }

    /// Request a refresh and wait for the run that serves it.
    ///
    /// A request made while a run is in flight resolves with that run's
    /// outcome and schedules one trailing run.
    pub async fn refresh(&self, trigger: LoadTrigger) -> bool {
        let run = {
            let mut session = self.inner.session();
            if let Some(run) = session.in_flight.clone() {
                session.pending = Some(trigger);
                debug!(target: "livedoc::refresh", %trigger, "refresh coalesced into in-flight run");
                run
            } else {
                let run = start(&self.inner, trigger);
                session.in_flight = Some(run.clone());
                run
            }
        };
        run.await
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.session().in_flight.is_some()
    }

    /// Outcome of the last completed run; `false` before any run.
    #[must_use]
    pub fn last_ok(&self) -> bool {
        self.inner.session().last_ok
    }

    /// Number of completed runs.
    #[must_use]
    pub fn completed_runs(&self) -> u64 {
        self.inner.session().completed
    }

    /// Receiver of the render generation, bumped after every completed run.
    #[must_use]
    pub fn subscribe_renders(&self) -> watch::Receiver<u64> {
        self.inner.renders.subscribe()
    }

    #[must_use]
    pub fn root(&self) -> &Scope<S::Value> {
        &self.inner.root
    }

    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.inner.source
    }
}

/// Build one run. On completion the run publishes, then either hands the
/// session to a trailing run or clears it.
fn start<S: UserModuleSource>(inner: &Arc<Inner<S>>, trigger: LoadTrigger) -> SharedRun {
    let inner = Arc::clone(inner);
    let run: BoxFuture<'static, bool> = Box::pin(async move {
        info!(target: "livedoc::refresh", %trigger, "refresh started");
        let outcome = inner.source.load(trigger).await;
        let ok = outcome.ok;

        inner.root.set_many(outcome.registry);
        inner.renders.send_modify(|generation| *generation += 1);

        let trailing = {
            let mut session = inner.session();
            session.last_ok = ok;
            session.completed += 1;
            match session.pending.take() {
                Some(next_trigger) => {
                    let next = start(&inner, next_trigger);
                    session.in_flight = Some(next.clone());
                    Some(next)
                }
                None => {
                    session.in_flight = None;
                    None
                }
            }
        };
        info!(target: "livedoc::refresh", %trigger, ok, trailing = trailing.is_some(), "refresh finished");
        if let Some(next) = trailing {
            tokio::spawn(next);
        }
        ok
    });
    run.shared()
}
