//! Async fault boundary
//!
//! Wraps a [`BoundaryMachine`] with the deferred retry timer. The timer is a
//! task on the runtime captured at construction and holds only a weak
//! reference to the boundary; shutdown or the last drop aborts it, and a
//! timer whose epoch no longer matches is ignored.
//!
//! Observers and recovery hooks always run with no boundary lock held.

use crate::error::ContainmentError;
use crate::fault::PreviewFault;
use crate::machine::{BoundaryMachine, ContainmentState, FaultOutcome};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default delay before the single auto-recovery re-render
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Message shown when the boundary gives up
pub const MANUAL_RELOAD_MESSAGE: &str = "The preview stopped responding. Reload to try again.";

/// Fault observer; receives the fault and the state it produced
pub type FaultCallback = Arc<dyn Fn(&PreviewFault, ContainmentState) + Send + Sync>;

/// Recovery hook; runs once the retry timer moved the boundary back to `Stable`
pub type RecoveryCallback = Arc<dyn Fn() + Send + Sync>;

/// Boundary configuration
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Label used in logs
    pub name: String,
    /// Delay before the deferred re-render
    pub retry_delay: Duration,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            name: "preview".to_owned(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BoundaryConfig {
    /// Set the log label
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the retry delay
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// What the wrapped subtree should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySurface {
    /// The contained content
    Content,
    /// Placeholder while the retry is pending
    Recovering,
    /// Minimal surface asking for a full reload
    ManualReload {
        /// User-facing text
        message: String,
    },
}

/// Observable boundary state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundarySnapshot {
    /// Machine state
    pub state: ContainmentState,
    /// Whether the auto-recovery was spent
    pub recovery_used: bool,
    /// Faults received
    pub faults: u32,
    /// Most recent fault
    pub last_fault: Option<PreviewFault>,
}

impl BoundarySnapshot {
    /// Surface to render for this snapshot
    #[must_use]
    pub fn surface(&self) -> RecoverySurface {
        match self.state {
            ContainmentState::Stable => RecoverySurface::Content,
            ContainmentState::Retrying => RecoverySurface::Recovering,
            ContainmentState::Terminal => RecoverySurface::ManualReload {
                message: MANUAL_RELOAD_MESSAGE.to_owned(),
            },
        }
    }
}

/// Run `f`, turning a panic into a [`PreviewFault`]
///
/// Nothing is recorded. Pair with [`FaultBoundary::record_fault`] when the
/// call has to happen under a caller-held lock.
pub fn catch_fault<T, F>(f: F) -> Result<T, PreviewFault>
where
    F: FnOnce() -> Result<T, PreviewFault>,
{
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PreviewFault::from_panic(payload.as_ref())))
}

struct Inner {
    config: BoundaryConfig,
    runtime: Handle,
    machine: Mutex<BoundaryMachine>,
    timer: Mutex<Option<JoinHandle<()>>>,
    observers: Mutex<Vec<FaultCallback>>,
    recovery_hooks: Mutex<Vec<RecoveryCallback>>,
    state_tx: watch::Sender<BoundarySnapshot>,
    closed: AtomicBool,
}

impl Inner {
    fn publish(&self, machine: &BoundaryMachine, last_fault: Option<PreviewFault>) {
        self.state_tx.send_modify(|snap| {
            snap.state = machine.state();
            snap.recovery_used = machine.recovery_used();
            snap.faults = machine.fault_count();
            if last_fault.is_some() {
                snap.last_fault = last_fault;
            }
        });
    }

    fn fire_timer(&self, epoch: u64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut machine = self.machine.lock();
        let recovered = machine.on_timer(epoch);
        if recovered {
            self.publish(&machine, None);
        }
        drop(machine);
        // Detach before the hooks run so a fault raised by them cannot abort
        // the task executing them.
        self.timer.lock().take();

        if !recovered {
            tracing::debug!(boundary = %self.config.name, epoch, "stale retry timer ignored");
            return;
        }
        tracing::info!(boundary = %self.config.name, "auto-recovery re-render");
        let hooks: Vec<RecoveryCallback> = self.recovery_hooks.lock().clone();
        for hook in hooks {
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            hook();
        }
    }

    fn abort_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Supervisor for one contained subtree
///
/// Clones share the same boundary. Recreate it to get back to `Stable`
/// after `Terminal`.
#[derive(Clone)]
pub struct FaultBoundary {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FaultBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl FaultBoundary {
    /// Fresh boundary in `Stable`, timed on the current Tokio runtime
    ///
    /// # Errors
    /// [`ContainmentError::NoRuntime`] when called outside a runtime
    pub fn new(config: BoundaryConfig) -> Result<Self, ContainmentError> {
        let runtime =
            Handle::try_current().map_err(|_| ContainmentError::NoRuntime(config.name.clone()))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Fresh boundary in `Stable`, timed on `runtime`
    #[must_use]
    pub fn with_runtime(config: BoundaryConfig, runtime: Handle) -> Self {
        let (state_tx, _) = watch::channel(BoundarySnapshot::default());
        Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                machine: Mutex::new(BoundaryMachine::new()),
                timer: Mutex::new(None),
                observers: Mutex::new(Vec::new()),
                recovery_hooks: Mutex::new(Vec::new()),
                state_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ContainmentState {
        self.inner.machine.lock().state()
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> BoundarySnapshot {
        self.inner.state_tx.borrow().clone()
    }

    /// What to render now
    #[must_use]
    pub fn surface(&self) -> RecoverySurface {
        self.snapshot().surface()
    }

    /// Watch state changes
    ///
    /// Intermediate states may be coalesced; use
    /// [`on_recover`](Self::on_recover) to act on the recovery edge itself.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BoundarySnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Register a fault observer
    pub fn on_fault<F>(&self, callback: F)
    where
        F: Fn(&PreviewFault, ContainmentState) + Send + Sync + 'static,
    {
        self.inner.observers.lock().push(Arc::new(callback));
    }

    /// Register a hook for the `Retrying → Stable` edge
    ///
    /// Runs on the timer task, exactly once per recovery.
    pub fn on_recover<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.recovery_hooks.lock().push(Arc::new(hook));
    }

    /// Whether a retry timer is armed
    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Record a fault and drive the machine
    ///
    /// In `Stable` with the recovery unused, arms the retry timer. After
    /// shutdown the fault is dropped.
    pub fn record_fault(&self, fault: PreviewFault) -> ContainmentState {
        let name = &self.inner.config.name;
        if self.is_shut_down() {
            tracing::debug!(boundary = %name, %fault, "fault after shutdown dropped");
            return self.state();
        }

        let mut machine = self.inner.machine.lock();
        let outcome = machine.on_fault();
        let state = machine.state();

        match outcome {
            FaultOutcome::ScheduleRetry { epoch } => {
                self.arm_timer(epoch);
                tracing::warn!(boundary = %name, %fault, delay_ms = self.retry_delay_ms(), "fault contained, retry scheduled");
            }
            FaultOutcome::Escalated => {
                self.inner.abort_timer();
                tracing::warn!(boundary = %name, %fault, "fault contained, manual reload required");
            }
            FaultOutcome::Absorbed => {
                tracing::debug!(boundary = %name, %fault, "fault absorbed by terminal boundary");
            }
        }

        self.inner.publish(&machine, Some(fault.clone()));
        drop(machine);

        let observers: Vec<FaultCallback> = self.inner.observers.lock().clone();
        for observer in observers {
            observer(&fault, state);
        }
        state
    }

    /// Run `f` inside the boundary
    ///
    /// An `Err` or a panic is recorded as a fault and yields `None`. In
    /// `Terminal` nothing runs.
    pub fn contain<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, PreviewFault>,
    {
        if self.state() == ContainmentState::Terminal {
            return None;
        }
        match catch_fault(f) {
            Ok(value) => Some(value),
            Err(fault) => {
                self.record_fault(fault);
                None
            }
        }
    }

    /// Cancel the pending timer and stop accepting faults
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.abort_timer();
            tracing::debug!(boundary = %self.inner.config.name, "boundary shut down");
        }
    }

    fn arm_timer(&self, epoch: u64) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.config.retry_delay;
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_timer(epoch);
            }
        });
        if let Some(previous) = self.inner.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn retry_delay_ms(&self) -> u64 {
        u64::try_from(self.inner.config.retry_delay.as_millis()).unwrap_or(u64::MAX)
    }
}
