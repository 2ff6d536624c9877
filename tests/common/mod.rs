//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use genome_gateway::engine::{Engine, EngineInvocation, EngineResult};
use genome_gateway::tools::{Defaults, ToolRouter};
use genome_gateway::GatewayError;
use serde_json::json;

type Responder = Box<dyn Fn(&EngineInvocation) -> EngineResult + Send + Sync>;

/// In-memory engine that records every invocation and the peak number of
/// invocations in flight at once.
pub struct FakeEngine {
    calls: Mutex<Vec<EngineInvocation>>,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    respond: Responder,
}

impl FakeEngine {
    /// Answers every call with `{operation, args}` built from the invocation.
    pub fn echo() -> Self {
        Self::with_responder(|invocation| Ok(echo_payload(invocation)))
    }

    /// Echoes, except invocations matching `fails` get an engine error.
    pub fn failing_when(fails: impl Fn(&EngineInvocation) -> bool + Send + Sync + 'static) -> Self {
        Self::with_responder(move |invocation| {
            if fails(invocation) {
                Err(GatewayError::Engine {
                    operation: invocation.operation().to_owned(),
                    message: "upstream rejected the request".to_owned(),
                })
            } else {
                Ok(echo_payload(invocation))
            }
        })
    }

    pub fn with_responder(
        respond: impl Fn(&EngineInvocation) -> EngineResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
            respond: Box::new(respond),
        }
    }

    /// Hold each invocation open for `delay` so overlap is observable.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<EngineInvocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Engine for FakeEngine {
    fn invoke(&self, invocation: &EngineInvocation) -> EngineResult {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = (self.respond)(invocation);
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// `{operation, args: {flag: value}, input: <stdin document>}`.
pub fn echo_payload(invocation: &EngineInvocation) -> serde_json::Value {
    let args: serde_json::Map<String, serde_json::Value> = invocation
        .args()
        .iter()
        .map(|(flag, value)| (flag.clone(), json!(value)))
        .collect();
    json!({
        "operation": invocation.operation(),
        "args": args,
        "input": invocation.inputs(),
    })
}

/// Router over `engine` with default settings; the engine stays inspectable.
pub fn router(engine: FakeEngine) -> (ToolRouter, Arc<FakeEngine>) {
    let engine = Arc::new(engine);
    let router = ToolRouter::new(engine.clone(), Defaults::default());
    (router, engine)
}
