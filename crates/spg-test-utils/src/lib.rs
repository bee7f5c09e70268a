//! Testing utilities for SPG workspace
//!
//! Shared generators, sandboxes, and file set fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use spg_containment::PreviewFault;
use spg_overlay::{GeneratedFileSet, MergedFileSet};
use spg_runtime::{
    GenerationError, GenerationRequest, Generator, Sandbox, SandboxFactory, TeardownReport,
};
use spg_scope::PreviewId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn generated_set(files: &[(&str, &str)]) -> GeneratedFileSet {
    GeneratedFileSet::from_raw(files.iter().copied()).unwrap()
}

/// Minimal storefront that imports both protected modules
pub fn storefront_app() -> GeneratedFileSet {
    generated_set(&[
        (
            "/App.tsx",
            "import { useSellsPayCheckout } from '@/hooks/useSellsPayCheckout';\n\
             import { cn } from '@/lib/utils';\n\
             import Hero from './components/Hero';\n\
             export default function App() { return null; }",
        ),
        ("/components/Hero.tsx", "export default function Hero() { return null; }"),
    ])
}

enum Scripted {
    Files(GeneratedFileSet),
    Fail(String),
}

struct Step {
    delay: Option<Duration>,
    reply: Scripted,
}

/// Generator replaying a queue of scripted replies
///
/// Once the queue is empty every call fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, files: GeneratedFileSet) -> Self {
        self.push(None, Scripted::Files(files))
    }

    pub fn respond_after(self, delay: Duration, files: GeneratedFileSet) -> Self {
        self.push(Some(delay), Scripted::Files(files))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(None, Scripted::Fail(message.to_owned()))
    }

    pub fn fail_after(self, delay: Duration, message: &str) -> Self {
        self.push(Some(delay), Scripted::Fail(message.to_owned()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    fn push(self, delay: Option<Duration>, reply: Scripted) -> Self {
        self.steps.lock().push_back(Step { delay, reply });
        self
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedFileSet, GenerationError> {
        self.prompts.lock().push(request.prompt.clone());
        let step = self.steps.lock().pop_front();
        let Some(step) = step else {
            return Err(GenerationError::Backend("script exhausted".to_owned()));
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        match step.reply {
            Scripted::Files(files) => Ok(files),
            Scripted::Fail(message) => Err(GenerationError::Backend(message)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxEvent {
    Created(PreviewId),
    Mounted(PreviewId),
    MountFailed(PreviewId),
    TornDown(PreviewId),
}

#[derive(Default)]
struct LogInner {
    events: Vec<SandboxEvent>,
    bundles: Vec<(PreviewId, MergedFileSet)>,
    failures_left: usize,
    panic_on_mount: bool,
    timers_per_sandbox: usize,
}

/// Factory whose sandboxes record every lifecycle event
#[derive(Clone, Default)]
pub struct RecordingSandboxFactory {
    log: Arc<Mutex<LogInner>>,
}

impl RecordingSandboxFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `n` mounts fault
    pub fn fail_mounts(self, n: usize) -> Self {
        self.log.lock().failures_left = n;
        self
    }

    /// Every mount panics
    pub fn panic_on_mount(self) -> Self {
        self.log.lock().panic_on_mount = true;
        self
    }

    /// Timers each sandbox reports releasing on teardown
    pub fn with_timers(self, n: usize) -> Self {
        self.log.lock().timers_per_sandbox = n;
        self
    }

    pub fn events(&self) -> Vec<SandboxEvent> {
        self.log.lock().events.clone()
    }

    pub fn count(&self, matches: impl Fn(&SandboxEvent) -> bool) -> usize {
        self.log.lock().events.iter().filter(|e| matches(e)).count()
    }

    /// Sandboxes created but not yet torn down
    pub fn live(&self) -> usize {
        let created = self.count(|e| matches!(e, SandboxEvent::Created(_)));
        let torn = self.count(|e| matches!(e, SandboxEvent::TornDown(_)));
        created - torn
    }

    /// Last bundle successfully mounted
    pub fn last_bundle(&self) -> Option<MergedFileSet> {
        self.log.lock().bundles.last().map(|(_, b)| b.clone())
    }
}

impl SandboxFactory for RecordingSandboxFactory {
    fn create(&self, preview: PreviewId) -> Box<dyn Sandbox> {
        self.log.lock().events.push(SandboxEvent::Created(preview));
        Box::new(RecordingSandbox {
            preview,
            log: Arc::clone(&self.log),
            mounted: false,
            torn_down: false,
        })
    }
}

pub struct RecordingSandbox {
    preview: PreviewId,
    log: Arc<Mutex<LogInner>>,
    mounted: bool,
    torn_down: bool,
}

impl Sandbox for RecordingSandbox {
    fn mount(&mut self, files: &MergedFileSet) -> Result<(), PreviewFault> {
        let mut log = self.log.lock();
        if log.panic_on_mount {
            log.events.push(SandboxEvent::MountFailed(self.preview));
            drop(log);
            panic!("sandbox exploded");
        }
        if log.failures_left > 0 {
            log.failures_left -= 1;
            log.events.push(SandboxEvent::MountFailed(self.preview));
            return Err(PreviewFault::mount("scripted mount failure"));
        }
        log.events.push(SandboxEvent::Mounted(self.preview));
        log.bundles.push((self.preview, files.clone()));
        self.mounted = true;
        Ok(())
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut log = self.log.lock();
        if self.torn_down {
            return TeardownReport::default();
        }
        self.torn_down = true;
        log.events.push(SandboxEvent::TornDown(self.preview));
        TeardownReport {
            modules: usize::from(self.mounted),
            timers: log.timers_per_sandbox,
            listeners: 0,
        }
    }
}
