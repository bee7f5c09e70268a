//! Preview runtime
//!
//! Owns one preview slot. A mount runs:
//! 1. safety gate (blocked prompts never reach the generator)
//! 2. generator call, bounded by the configured timeout
//! 3. overlay merge
//! 4. teardown of the previous context, then a fresh sandbox tagged with a
//!    new storefront scope
//!
//! Faults raised inside the sandbox stop at the slot's [`FaultBoundary`].
//! Responses to anything but the latest request are discarded; unmounting
//! the active preview also discards the pending one.
//!
//! The slot lock only guards the swap of the active entry. Sandbox calls,
//! fault observers and recovery hooks run after it is released.

use crate::config::PreviewConfig;
use crate::error::{GenerationError, PreviewError, StartupError};
use crate::generator::{GenerationRequest, Generator};
use crate::sandbox::{Sandbox, SandboxFactory, TeardownReport};
use parking_lot::Mutex;
use spg_containment::{
    catch_fault, BoundaryConfig, BoundarySnapshot, ContainmentState, FaultBoundary, PreviewFault,
    RecoverySurface,
};
use spg_moderation::SafetyGate;
use spg_overlay::{merge, MergedFileSet, Overlay};
use spg_scope::{ElementId, PreviewId, ScopeBinding, ScopeController};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Monotonic generation request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Handle to the mounted preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    /// Scope instance of the mounted preview
    pub preview: PreviewId,
    /// Request that produced it
    pub request: RequestId,
}

impl Display for PreviewHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.preview, self.request)
    }
}

type SharedSandbox = Arc<Mutex<Box<dyn Sandbox>>>;

#[derive(Clone)]
struct ActivePreview {
    handle: PreviewHandle,
    root: ElementId,
    merged: Arc<MergedFileSet>,
    sandbox: SharedSandbox,
    boundary: FaultBoundary,
}

struct Shared {
    config: PreviewConfig,
    gate: SafetyGate,
    overlay: Arc<Overlay>,
    scopes: Arc<ScopeController>,
    generator: Arc<dyn Generator>,
    sandboxes: Arc<dyn SandboxFactory>,
    requests: AtomicU64,
    slot: Mutex<Option<ActivePreview>>,
}

impl Shared {
    fn latest(&self) -> RequestId {
        RequestId(self.requests.load(Ordering::Acquire))
    }

    /// Clone of the slot entry for `handle`, taken under the slot lock
    fn find(&self, handle: PreviewHandle) -> Option<ActivePreview> {
        self.slot
            .lock()
            .as_ref()
            .filter(|a| a.handle == handle)
            .cloned()
    }

    /// Release an entry already removed from the slot
    fn teardown(&self, active: ActivePreview) -> TeardownReport {
        // Shut down first: a re-render holding the sandbox lock sees it and stops.
        active.boundary.shutdown();
        let report = active.sandbox.lock().teardown();
        self.scopes.release_preview(active.handle.preview);
        tracing::info!(
            handle = %active.handle,
            modules = report.modules,
            timers = report.timers,
            listeners = report.listeners,
            "preview torn down"
        );
        report
    }

    /// Mount the bundle into the entry's sandbox; a fault goes to its boundary
    fn mount_sandbox(&self, active: &ActivePreview) -> bool {
        let attempt = {
            let mut sandbox = active.sandbox.lock();
            if active.boundary.is_shut_down() {
                return false;
            }
            catch_fault(|| sandbox.mount(&active.merged))
        };
        match attempt {
            Ok(()) => true,
            Err(fault) => {
                active.boundary.record_fault(fault);
                false
            }
        }
    }

    /// Deferred re-render after the boundary recovered
    fn rerender(&self, handle: PreviewHandle) {
        let Some(active) = self.find(handle) else {
            return;
        };
        let released = {
            let mut sandbox = active.sandbox.lock();
            if active.boundary.is_shut_down()
                || active.boundary.state() == ContainmentState::Terminal
            {
                return;
            }
            let released = sandbox.teardown();
            *sandbox = self.sandboxes.create(handle.preview);
            released
        };
        let mounted = self.mount_sandbox(&active);
        tracing::info!(%handle, mounted, released_modules = released.modules, "preview re-rendered");
    }
}

/// Builder for [`PreviewRuntime`]
pub struct PreviewRuntimeBuilder {
    config: PreviewConfig,
    generator: Arc<dyn Generator>,
    sandboxes: Arc<dyn SandboxFactory>,
    scopes: Option<Arc<ScopeController>>,
    overlay: Option<Arc<Overlay>>,
}

impl PreviewRuntimeBuilder {
    /// Share an existing scope controller (one per event bus)
    #[must_use]
    pub fn with_scope_controller(mut self, scopes: Arc<ScopeController>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Use a prebuilt overlay instead of building one from config
    #[must_use]
    pub fn with_overlay(mut self, overlay: Arc<Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Validate configuration and build
    ///
    /// # Errors
    /// [`StartupError`] when the overlay misses a protected entry or the
    /// moderation catalog is malformed
    pub fn build(self) -> Result<PreviewRuntime, StartupError> {
        let overlay = match self.overlay {
            Some(overlay) => overlay,
            None => Arc::new(Overlay::from_config(&self.config.overlay)?),
        };
        let gate = SafetyGate::new(self.config.moderation.build_catalog()?);

        tracing::info!(
            overlay_files = overlay.len(),
            protected = overlay.protected().len(),
            categories = gate.catalog().len(),
            "preview runtime ready"
        );

        Ok(PreviewRuntime {
            shared: Arc::new(Shared {
                config: self.config,
                gate,
                overlay,
                scopes: self.scopes.unwrap_or_default(),
                generator: self.generator,
                sandboxes: self.sandboxes,
                requests: AtomicU64::new(0),
                slot: Mutex::new(None),
            }),
        })
    }
}

/// Runs prompts through the safety boundary into one preview slot
///
/// Fault callbacks registered with [`on_fault`](Self::on_fault) run
/// synchronously on the faulting path with no runtime lock held, so they may
/// query or unmount the preview.
pub struct PreviewRuntime {
    shared: Arc<Shared>,
}

impl fmt::Debug for PreviewRuntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRuntime")
            .field("latest", &self.shared.latest())
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl PreviewRuntime {
    /// Start building a runtime
    #[must_use]
    pub fn builder(
        config: PreviewConfig,
        generator: Arc<dyn Generator>,
        sandboxes: Arc<dyn SandboxFactory>,
    ) -> PreviewRuntimeBuilder {
        PreviewRuntimeBuilder {
            config,
            generator,
            sandboxes,
            scopes: None,
            overlay: None,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PreviewConfig {
        &self.shared.config
    }

    /// Safety gate in use
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &SafetyGate {
        &self.shared.gate
    }

    /// Overlay in use
    #[inline]
    #[must_use]
    pub fn overlay(&self) -> &Arc<Overlay> {
        &self.shared.overlay
    }

    /// Scope controller shared with the host
    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &Arc<ScopeController> {
        &self.shared.scopes
    }

    /// Latest issued request
    #[inline]
    #[must_use]
    pub fn latest_request(&self) -> RequestId {
        self.shared.latest()
    }

    /// Handle of the mounted preview
    #[must_use]
    pub fn active(&self) -> Option<PreviewHandle> {
        self.shared.slot.lock().as_ref().map(|a| a.handle)
    }

    /// Submit a prompt and mount the result
    ///
    /// A fault while mounting is contained, not returned: the handle is
    /// still issued and the boundary reflects the fault.
    ///
    /// # Errors
    /// - [`PreviewError::ModerationBlocked`] before any generator call
    /// - [`PreviewError::GenerationBackendFailure`] on generator error or timeout
    /// - [`PreviewError::Superseded`] if a newer mount started, or the active
    ///   preview was unmounted, meanwhile
    #[tracing::instrument(skip_all, fields(request = tracing::field::Empty))]
    pub async fn mount(&self, prompt: &str) -> Result<PreviewHandle, PreviewError> {
        let request = RequestId(self.shared.requests.fetch_add(1, Ordering::AcqRel) + 1);
        tracing::Span::current().record("request", request.0);

        let verdict = self.shared.gate.validate_prompt(prompt);
        let Some(submission) = verdict.submission() else {
            return Err(verdict
                .blocking_warning()
                .map_or_else(
                    || PreviewError::ModerationBlocked {
                        category: String::from("unknown"),
                        message: String::from("prompt blocked"),
                    },
                    PreviewError::blocked,
                ));
        };

        let timeout = self.shared.config.generation_timeout();
        let generation = GenerationRequest::new(submission);
        let generated = tokio::time::timeout(timeout, self.shared.generator.generate(&generation))
            .await
            .unwrap_or(Err(GenerationError::Timeout(timeout)));

        let latest = self.shared.latest();
        if latest != request {
            tracing::debug!(%request, %latest, "stale generation discarded");
            return Err(PreviewError::Superseded { request, latest });
        }

        let generated = generated.map_err(|e| {
            tracing::warn!(error = %e, "generation failed");
            PreviewError::from(e)
        })?;

        let outcome = merge(&generated, &self.shared.overlay);
        if !outcome.shadowed.is_empty() {
            let shadowed: Vec<&str> = outcome.shadowed.iter().map(|p| p.as_str()).collect();
            tracing::warn!(?shadowed, "generator output shadowed protected modules");
        }
        tracing::debug!(
            files = outcome.files.len(),
            fingerprint = %outcome.files.fingerprint().short(),
            "merged"
        );

        self.install(request, outcome.files)
    }

    fn install(
        &self,
        request: RequestId,
        merged: MergedFileSet,
    ) -> Result<PreviewHandle, PreviewError> {
        let shared = &self.shared;

        let previous = {
            let mut slot = shared.slot.lock();
            let latest = shared.latest();
            if latest != request {
                return Err(PreviewError::Superseded { request, latest });
            }
            slot.take()
        };
        if let Some(previous) = previous {
            shared.teardown(previous);
        }

        let handle = PreviewHandle {
            preview: PreviewId::new(),
            request,
        };
        let root = ElementId::next();
        shared
            .scopes
            .tag_scope(root, ScopeBinding::Storefront(handle.preview))?;

        let boundary = match FaultBoundary::new(
            BoundaryConfig::default()
                .with_name(format!("preview-{}", handle.preview))
                .with_retry_delay(shared.config.retry_delay()),
        ) {
            Ok(boundary) => boundary,
            Err(e) => {
                shared.scopes.release_preview(handle.preview);
                return Err(e.into());
            }
        };
        let weak: Weak<Shared> = Arc::downgrade(shared);
        boundary.on_recover(move || {
            if let Some(shared) = weak.upgrade() {
                shared.rerender(handle);
            }
        });

        let active = ActivePreview {
            handle,
            root,
            merged: Arc::new(merged),
            sandbox: Arc::new(Mutex::new(shared.sandboxes.create(handle.preview))),
            boundary,
        };

        {
            let mut slot = shared.slot.lock();
            let latest = shared.latest();
            if latest != request {
                drop(slot);
                shared.teardown(active);
                return Err(PreviewError::Superseded { request, latest });
            }
            *slot = Some(active.clone());
        }

        let mounted = shared.mount_sandbox(&active);
        tracing::info!(%handle, %root, mounted, "preview mounted");
        Ok(handle)
    }

    /// Tear down the mounted preview
    ///
    /// A generation still in flight is discarded as superseded.
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn unmount(&self, handle: PreviewHandle) -> Result<TeardownReport, PreviewError> {
        let active = {
            let mut slot = self.shared.slot.lock();
            match slot.take() {
                Some(active) if active.handle == handle => {
                    self.shared.requests.fetch_add(1, Ordering::AcqRel);
                    active
                }
                other => {
                    *slot = other;
                    return Err(PreviewError::UnknownHandle(handle));
                }
            }
        };
        Ok(self.shared.teardown(active))
    }

    /// Register a fault observer on the preview's boundary
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn on_fault<F>(&self, handle: PreviewHandle, callback: F) -> Result<(), PreviewError>
    where
        F: Fn(&PreviewFault, ContainmentState) + Send + Sync + 'static,
    {
        self.with_active(handle, |active| active.boundary.on_fault(callback))
    }

    /// Deliver a runtime fault raised inside the sandbox
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn report_fault(
        &self,
        handle: PreviewHandle,
        fault: PreviewFault,
    ) -> Result<ContainmentState, PreviewError> {
        self.with_active(handle, |active| active.boundary.record_fault(fault))
    }

    /// Boundary snapshot of the preview
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn snapshot(&self, handle: PreviewHandle) -> Result<BoundarySnapshot, PreviewError> {
        self.with_active(handle, |active| active.boundary.snapshot())
    }

    /// What the preview pane should render
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn surface(&self, handle: PreviewHandle) -> Result<RecoverySurface, PreviewError> {
        self.with_active(handle, |active| active.boundary.surface())
    }

    /// Watch the preview's boundary
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn subscribe(
        &self,
        handle: PreviewHandle,
    ) -> Result<watch::Receiver<BoundarySnapshot>, PreviewError> {
        self.with_active(handle, |active| active.boundary.subscribe())
    }

    /// Merged bundle of the preview
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn merged(&self, handle: PreviewHandle) -> Result<Arc<MergedFileSet>, PreviewError> {
        self.with_active(handle, |active| Arc::clone(&active.merged))
    }

    /// Root element tagged with the preview's storefront scope
    ///
    /// # Errors
    /// [`PreviewError::UnknownHandle`] unless `handle` is the active preview
    pub fn root_element(&self, handle: PreviewHandle) -> Result<ElementId, PreviewError> {
        self.with_active(handle, |active| active.root)
    }

    fn with_active<T>(
        &self,
        handle: PreviewHandle,
        f: impl FnOnce(&ActivePreview) -> T,
    ) -> Result<T, PreviewError> {
        let active = self
            .shared
            .find(handle)
            .ok_or(PreviewError::UnknownHandle(handle))?;
        Ok(f(&active))
    }
}

impl Drop for PreviewRuntime {
    fn drop(&mut self) {
        let active = self.shared.slot.lock().take();
        if let Some(active) = active {
            self.shared.teardown(active);
        }
    }
}
