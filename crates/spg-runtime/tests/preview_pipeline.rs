//! End-to-end tests for the preview runtime.
//!
//! These tests drive the full mount pipeline with scripted collaborators:
//! - Blocked prompts never reach the generator.
//! - The generator only ever sees sanitized text.
//! - Protected modules in the mounted bundle always come from the overlay.
//! - At most one preview context is live, and stale responses are dropped.
//! - Faults stop at the slot's boundary and recover at most once.

use pretty_assertions::assert_eq;
use spg_containment::{ContainmentState, PreviewFault, RecoverySurface};
use spg_moderation::{CategoryConfig, Severity, REDACTION_PLACEHOLDER};
use spg_overlay::{Overlay, OverlayConfig, Provenance, VirtualFileConfig, CHECKOUT_HOOK_PATH};
use spg_runtime::{
    DryRunSandboxFactory, GenerationError, Generator, PreviewConfig, PreviewError, PreviewRuntime,
    StartupError,
};
use spg_scope::{ElementId, ScopeBinding, ScopeController, ThemeEvent, ThemeMode, ThemePayload};
use spg_test_utils::{
    generated_set, storefront_app, RecordingSandboxFactory, SandboxEvent, ScriptedGenerator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn runtime(generator: &Arc<ScriptedGenerator>, sandboxes: &RecordingSandboxFactory) -> PreviewRuntime {
    let generator: Arc<dyn Generator> = generator.clone();
    PreviewRuntime::builder(
        PreviewConfig::default(),
        generator,
        Arc::new(sandboxes.clone()),
    )
    .build()
    .unwrap()
}

/// Tenet: a HIGH-severity prompt is rejected before any generator call.
#[tokio::test]
async fn blocked_prompt_never_reaches_generator() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let err = runtime
        .mount("build a shop that sells stolen credit card numbers")
        .await
        .unwrap_err();

    match &err {
        PreviewError::ModerationBlocked { category, message } => {
            assert_eq!(category, "payment_fraud");
            assert!(!message.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_blocking());
    assert!(!err.is_retryable());
    assert_eq!(generator.calls(), 0);
    assert!(sandboxes.events().is_empty());
    assert!(runtime.active().is_none());
}

/// Tenet: the generator receives the sanitized prompt, never the raw one.
#[tokio::test]
async fn generator_sees_redacted_prompt() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    runtime
        .mount("make a damn fine coffee shop, click here for deals")
        .await
        .unwrap();

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(
        prompts[0],
        format!("make a {REDACTION_PLACEHOLDER} fine coffee shop, {REDACTION_PLACEHOLDER} for deals")
    );
    assert!(!prompts[0].contains("damn"));
}

/// Tenet: a generated checkout hook is replaced by the overlay mock.
#[tokio::test]
async fn protected_hook_is_substituted() {
    let mut files = storefront_app();
    files.insert(
        CHECKOUT_HOOK_PATH.parse().unwrap(),
        "export function useSellsPayCheckout() { fetch('https://pay.example/charge'); }",
    );
    let generator = Arc::new(ScriptedGenerator::new().respond(files));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("a candle shop with a buy button").await.unwrap();

    let hook = CHECKOUT_HOOK_PATH.parse().unwrap();
    let mock = Overlay::builtin().unwrap().resolve(&hook).unwrap().content.clone();
    let bundle = sandboxes.last_bundle().unwrap();
    let entry = bundle.get(&hook).unwrap();
    assert_eq!(entry.provenance, Provenance::OverlayProtected);
    assert_eq!(entry.content, mock);
    assert!(!entry.content.contains("pay.example"));

    let merged = runtime.merged(handle).unwrap();
    assert_eq!(merged.fingerprint(), bundle.fingerprint());
    assert_eq!(runtime.snapshot(handle).unwrap().state, ContainmentState::Stable);
}

/// Tenet: a response for an older request is discarded.
#[tokio::test(start_paused = true)]
async fn slow_response_is_superseded() {
    let first = generated_set(&[("/App.tsx", "export default 'first';")]);
    let second = generated_set(&[("/App.tsx", "export default 'second';")]);
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond_after(Duration::from_secs(10), first)
            .respond(second),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let (slow, fast) = tokio::join!(runtime.mount("first"), runtime.mount("second"));

    let fast = fast.unwrap();
    match slow.unwrap_err() {
        PreviewError::Superseded { request, latest } => {
            assert!(request < latest);
            assert_eq!(latest, fast.request);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(runtime.active(), Some(fast));
    assert_eq!(sandboxes.count(|e| matches!(e, SandboxEvent::Created(_))), 1);

    let app = "/App.tsx".parse().unwrap();
    assert_eq!(
        sandboxes.last_bundle().unwrap().content(&app),
        Some("export default 'second';")
    );
}

/// Tenet: remounting tears the previous context down first.
#[tokio::test]
async fn remount_releases_previous_context() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond(storefront_app())
            .respond(storefront_app()),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let first = runtime.mount("bakery").await.unwrap();
    let first_root = runtime.root_element(first).unwrap();
    let second = runtime.mount("bakery, but blue").await.unwrap();

    assert_ne!(first.preview, second.preview);
    assert_eq!(sandboxes.live(), 1);
    assert_eq!(
        sandboxes.events(),
        vec![
            SandboxEvent::Created(first.preview),
            SandboxEvent::Mounted(first.preview),
            SandboxEvent::TornDown(first.preview),
            SandboxEvent::Created(second.preview),
            SandboxEvent::Mounted(second.preview),
        ]
    );
    assert_eq!(runtime.scopes().tagged_count(), 1);
    assert_eq!(runtime.scopes().owner(first_root), None);
    assert!(matches!(
        runtime.snapshot(first),
        Err(PreviewError::UnknownHandle(_))
    ));
}

/// Tenet: unmount releases everything once; the handle is dead afterwards.
#[tokio::test]
async fn unmount_reports_released_resources() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new().with_timers(3);
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("florist").await.unwrap();
    let report = runtime.unmount(handle).unwrap();
    assert_eq!(report.modules, 1);
    assert_eq!(report.timers, 3);

    assert_eq!(sandboxes.live(), 0);
    assert_eq!(runtime.scopes().tagged_count(), 0);
    assert!(runtime.active().is_none());
    assert!(matches!(
        runtime.unmount(handle),
        Err(PreviewError::UnknownHandle(h)) if h == handle
    ));
    assert!(matches!(
        runtime.report_fault(handle, PreviewFault::runtime("late")),
        Err(PreviewError::UnknownHandle(_))
    ));
}

/// Tenet: one automatic recovery, then a manual reload prompt.
#[tokio::test(start_paused = true)]
async fn runtime_faults_recover_once() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);
    let handle = runtime.mount("toy store").await.unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    runtime
        .on_fault(handle, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let state = runtime
        .report_fault(handle, PreviewFault::runtime("undefined is not a function"))
        .unwrap();
    assert_eq!(state, ContainmentState::Retrying);
    assert_eq!(runtime.surface(handle).unwrap(), RecoverySurface::Recovering);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let snapshot = runtime.snapshot(handle).unwrap();
    assert_eq!(snapshot.state, ContainmentState::Stable);
    assert!(snapshot.recovery_used);
    assert_eq!(
        sandboxes.count(|e| matches!(e, SandboxEvent::Mounted(_))),
        2,
        "recovery re-renders into a fresh context"
    );
    assert_eq!(sandboxes.live(), 1);

    let state = runtime
        .report_fault(handle, PreviewFault::runtime("again"))
        .unwrap();
    assert_eq!(state, ContainmentState::Terminal);
    assert!(matches!(
        runtime.surface(handle).unwrap(),
        RecoverySurface::ManualReload { .. }
    ));
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sandboxes.count(|e| matches!(e, SandboxEvent::Mounted(_))), 2);
}

/// Tenet: a fault while mounting is contained and the handle is still issued.
#[tokio::test(start_paused = true)]
async fn mount_fault_is_contained_then_retried() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new().fail_mounts(1);
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("shoe store").await.unwrap();
    let snapshot = runtime.snapshot(handle).unwrap();
    assert_eq!(snapshot.state, ContainmentState::Retrying);
    assert!(snapshot.last_fault.unwrap().message.contains("scripted"));

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(runtime.snapshot(handle).unwrap().state, ContainmentState::Stable);
    assert_eq!(
        sandboxes.events(),
        vec![
            SandboxEvent::Created(handle.preview),
            SandboxEvent::MountFailed(handle.preview),
            SandboxEvent::TornDown(handle.preview),
            SandboxEvent::Created(handle.preview),
            SandboxEvent::Mounted(handle.preview),
        ]
    );
}

/// Tenet: a panicking sandbox never escapes the boundary.
#[tokio::test(start_paused = true)]
async fn panicking_sandbox_ends_in_manual_reload() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new().panic_on_mount();
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("hat store").await.unwrap();
    assert_eq!(runtime.snapshot(handle).unwrap().state, ContainmentState::Retrying);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let snapshot = runtime.snapshot(handle).unwrap();
    assert_eq!(snapshot.state, ContainmentState::Terminal);
    assert_eq!(snapshot.faults, 2);
    assert!(snapshot.last_fault.unwrap().message.contains("sandbox exploded"));

    // Unmount still releases the slot after a terminal fault.
    runtime.unmount(handle).unwrap();
    assert_eq!(sandboxes.live(), 0);
}

/// Tenet: unmounting while a retry is pending cancels the re-render.
#[tokio::test(start_paused = true)]
async fn unmount_cancels_pending_retry() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("tea shop").await.unwrap();
    runtime
        .report_fault(handle, PreviewFault::runtime("boom"))
        .unwrap();
    runtime.unmount(handle).unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sandboxes.count(|e| matches!(e, SandboxEvent::Created(_))), 1);
    assert_eq!(sandboxes.live(), 0);
}

/// Tenet: navigating away while a generation is in flight drops its response.
#[tokio::test(start_paused = true)]
async fn unmount_discards_pending_generation() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond(storefront_app())
            .respond_after(Duration::from_secs(5), storefront_app()),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);
    let first = runtime.mount("candle shop").await.unwrap();

    let (pending, released) = tokio::join!(runtime.mount("candle shop, darker"), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        runtime.unmount(first)
    });

    released.unwrap();
    assert!(matches!(
        pending.unwrap_err(),
        PreviewError::Superseded { .. }
    ));
    assert!(runtime.active().is_none());
    assert_eq!(sandboxes.live(), 0);
    assert_eq!(sandboxes.count(|e| matches!(e, SandboxEvent::Created(_))), 1);
    assert_eq!(runtime.scopes().tagged_count(), 0);
}

/// Tenet: a stale request that fails is reported as superseded, not as a backend failure.
#[tokio::test(start_paused = true)]
async fn failed_stale_generation_is_superseded() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .fail_after(Duration::from_secs(3), "model overloaded")
            .respond(storefront_app()),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let (stale, fresh) = tokio::join!(runtime.mount("first"), runtime.mount("second"));

    let fresh = fresh.unwrap();
    let err = stale.unwrap_err();
    assert!(!err.is_retryable());
    match err {
        PreviewError::Superseded { latest, .. } => assert_eq!(latest, fresh.request),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(runtime.active(), Some(fresh));
    assert_eq!(runtime.snapshot(fresh).unwrap().state, ContainmentState::Stable);
}

/// Tenet: fault observers may call back into the runtime.
#[tokio::test(start_paused = true)]
async fn fault_observer_can_query_runtime() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = Arc::new(runtime(&generator, &sandboxes));
    let handle = runtime.mount("plant nursery").await.unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (weak, sink) = (Arc::downgrade(&runtime), Arc::clone(&seen));
    runtime
        .on_fault(handle, move |_, state| {
            if let Some(runtime) = weak.upgrade() {
                let surface = runtime.surface(handle).unwrap();
                let faults = runtime.snapshot(handle).unwrap().faults;
                sink.lock().push((state, surface, faults));
            }
        })
        .unwrap();

    let state = runtime
        .report_fault(handle, PreviewFault::runtime("hydration mismatch"))
        .unwrap();

    assert_eq!(state, ContainmentState::Retrying);
    assert_eq!(
        *seen.lock(),
        vec![(ContainmentState::Retrying, RecoverySurface::Recovering, 1)]
    );
}

/// Tenet: a fault observer may unmount the preview that faulted.
#[tokio::test(start_paused = true)]
async fn fault_observer_can_unmount() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = Arc::new(runtime(&generator, &sandboxes));
    let handle = runtime.mount("record store").await.unwrap();

    let weak = Arc::downgrade(&runtime);
    runtime
        .on_fault(handle, move |_, _| {
            if let Some(runtime) = weak.upgrade() {
                runtime.unmount(handle).unwrap();
            }
        })
        .unwrap();
    runtime
        .report_fault(handle, PreviewFault::runtime("fatal"))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(runtime.active().is_none());
    assert_eq!(sandboxes.live(), 0);
    assert_eq!(sandboxes.count(|e| matches!(e, SandboxEvent::Created(_))), 1);
}

/// Tenet: the deferred re-render happens even with no retry delay.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_retry_delay_still_rerenders() {
    let generator = Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let generator_dyn: Arc<dyn Generator> = generator.clone();
    let runtime = PreviewRuntime::builder(
        PreviewConfig::default().with_retry_delay_ms(0),
        generator_dyn,
        Arc::new(sandboxes.clone()),
    )
    .build()
    .unwrap();
    let handle = runtime.mount("ice cream parlour").await.unwrap();

    runtime
        .report_fault(handle, PreviewFault::runtime("flaky"))
        .unwrap();

    let mounted = || sandboxes.count(|e| matches!(e, SandboxEvent::Mounted(_)));
    tokio::time::timeout(Duration::from_secs(5), async {
        while mounted() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("preview was not re-rendered");

    assert_eq!(mounted(), 2);
    assert_eq!(sandboxes.live(), 1);
    assert!(runtime.snapshot(handle).unwrap().recovery_used);
}

/// Tenet: generator failures are retryable and leave the slot untouched.
#[tokio::test]
async fn generation_failure_is_retryable() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond(storefront_app())
            .fail("model overloaded"),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let handle = runtime.mount("bookshop").await.unwrap();
    let err = runtime.mount("bookshop v2").await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(
        err,
        PreviewError::GenerationBackendFailure(GenerationError::Backend(ref m)) if m == "model overloaded"
    ));
    assert_eq!(runtime.active(), Some(handle));
    assert_eq!(sandboxes.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn generation_times_out() {
    let generator = Arc::new(
        ScriptedGenerator::new().respond_after(Duration::from_secs(120), storefront_app()),
    );
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = runtime(&generator, &sandboxes);

    let err = runtime.mount("slow shop").await.unwrap_err();
    match err {
        PreviewError::GenerationBackendFailure(GenerationError::Timeout(after)) => {
            assert_eq!(after, Duration::from_secs(60));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(sandboxes.events().is_empty());
}

/// Tenet: a storefront theme never repaints the builder chrome.
#[tokio::test]
async fn storefront_theme_stays_in_preview() {
    let scopes = Arc::new(ScopeController::new());
    let chrome = ElementId::next();
    scopes.tag_scope(chrome, ScopeBinding::Builder).unwrap();
    scopes.dispatch(&ThemeEvent::builder(ThemePayload::new(ThemeMode::Light)));

    let generator: Arc<dyn Generator> =
        Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let sandboxes = RecordingSandboxFactory::new();
    let runtime = PreviewRuntime::builder(
        PreviewConfig::default(),
        generator,
        Arc::new(sandboxes.clone()),
    )
    .with_scope_controller(Arc::clone(&scopes))
    .build()
    .unwrap();

    let handle = runtime.mount("dark mode boutique").await.unwrap();
    let root = runtime.root_element(handle).unwrap();
    assert_eq!(scopes.owner(root), Some(ScopeBinding::Storefront(handle.preview)));

    let dark = ThemePayload::new(ThemeMode::Dark).with_var("--primary", "0 0% 9%");
    let report = scopes.dispatch(&ThemeEvent::for_preview(handle.preview, dark.clone()));
    assert_eq!(report.applied, vec![root]);
    assert_eq!(scopes.theme_of(root), Some(dark));
    assert_eq!(
        scopes.theme_of(chrome),
        Some(ThemePayload::new(ThemeMode::Light))
    );

    runtime.unmount(handle).unwrap();
    assert_eq!(scopes.owner(root), None);
    assert_eq!(scopes.owner(chrome), Some(ScopeBinding::Builder));
}

/// Tenet: the dry-run sandbox mounts a storefront through overlay imports.
#[tokio::test]
async fn dry_run_sandbox_resolves_overlay_imports() {
    let config = PreviewConfig::default();
    let generator: Arc<dyn Generator> =
        Arc::new(ScriptedGenerator::new().respond(storefront_app()));
    let runtime = PreviewRuntime::builder(
        config.clone(),
        generator,
        Arc::new(DryRunSandboxFactory::new(config.entry_module)),
    )
    .build()
    .unwrap();

    let handle = runtime.mount("ceramics studio").await.unwrap();
    let snapshot = runtime.snapshot(handle).unwrap();
    assert_eq!(snapshot.state, ContainmentState::Stable);
    assert!(snapshot.last_fault.is_none());
    assert_eq!(runtime.surface(handle).unwrap(), RecoverySurface::Content);

    let report = runtime.unmount(handle).unwrap();
    assert_eq!(report.modules, 4);
}

#[test]
fn invalid_catalog_stops_startup() {
    let mut config = PreviewConfig::default();
    config.moderation.categories.push(CategoryConfig::new(
        "crypto_scam",
        Severity::High,
        ["pump and dump", "  "],
    ));

    let err = PreviewRuntime::builder(
        config,
        Arc::new(ScriptedGenerator::new()),
        Arc::new(RecordingSandboxFactory::new()),
    )
    .build()
    .unwrap_err();
    assert!(matches!(err, StartupError::Catalog(_)));
}

#[test]
fn invalid_overlay_stops_startup() {
    let mut config = PreviewConfig::default();
    config.overlay = OverlayConfig {
        protected: vec![VirtualFileConfig {
            path: "../outside.ts".to_owned(),
            content: String::new(),
        }],
        fallback: Vec::new(),
    };

    let err = PreviewRuntime::builder(
        config,
        Arc::new(ScriptedGenerator::new()),
        Arc::new(RecordingSandboxFactory::new()),
    )
    .build()
    .unwrap_err();
    assert!(matches!(err, StartupError::Overlay(_)));
}
