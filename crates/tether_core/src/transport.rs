//! The seam between the engine and whatever turns a location into a resource.
//!
//! A transport receives [`FetchRequest`]s and reports back through a
//! [`CompletionSender`]. The engine drains the matching receiver, so
//! completions may arrive in any order and from any thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::CorsMode;
use crate::define::Definition;
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Canonical location of the node that asked first.
    pub location: String,
    /// Where to actually fetch from; differs when a hook rewrote it.
    pub request_location: String,
    pub charset: Option<String>,
    pub cors: Option<CorsMode>,
}

/// What evaluating a fetched resource produced.
#[derive(Debug)]
pub enum Payload {
    /// The resource's own define calls, in order.
    Definitions(Vec<Definition>),
    /// Source text. Defined as a module exporting the text, with statically
    /// extracted dependencies.
    Text(String),
    /// A data resource exporting this value.
    Json(Value),
}

impl Payload {
    pub fn define(definition: Definition) -> Self {
        Self::Definitions(vec![definition])
    }

    pub fn empty() -> Self {
        Self::Definitions(Vec::new())
    }
}

#[derive(Debug)]
pub struct Completion {
    /// The `request_location` of the request being completed.
    pub location: String,
    pub outcome: Result<Payload, FetchError>,
}

impl Completion {
    pub fn ok(location: impl Into<String>, payload: Payload) -> Self {
        Self {
            location: location.into(),
            outcome: Ok(payload),
        }
    }

    pub fn failed(location: impl Into<String>, error: FetchError) -> Self {
        Self {
            location: location.into(),
            outcome: Err(error),
        }
    }
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

pub fn channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

pub trait Transport {
    /// Start fetching. Must not block; report through the completion channel.
    fn request(&mut self, request: FetchRequest);
}

/// Shared record of every request a transport received.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<FetchRequest>>>);

impl RequestLog {
    pub fn record(&self, request: &FetchRequest) {
        if let Ok(mut requests) = self.0.lock() {
            requests.push(request.clone());
        }
    }

    pub fn locations(&self) -> Vec<String> {
        self.0
            .lock()
            .map(|requests| requests.iter().map(|r| r.request_location.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, location: &str) -> usize {
        self.0
            .lock()
            .map(|requests| requests.iter().filter(|r| r.request_location == location).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|requests| requests.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serves payloads from memory. Completion is queued immediately on request;
/// it is applied when the loader pumps its channel.
pub struct MemoryTransport {
    resources: HashMap<String, Result<Payload, FetchError>>,
    sender: CompletionSender,
    log: RequestLog,
}

impl MemoryTransport {
    pub fn new(sender: CompletionSender) -> Self {
        Self {
            resources: HashMap::new(),
            sender,
            log: RequestLog::default(),
        }
    }

    pub fn with(mut self, location: impl Into<String>, payload: Payload) -> Self {
        self.insert(location, payload);
        self
    }

    pub fn with_failure(mut self, location: impl Into<String>, error: FetchError) -> Self {
        self.resources.insert(location.into(), Err(error));
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, payload: Payload) {
        self.resources.insert(location.into(), Ok(payload));
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl Transport for MemoryTransport {
    fn request(&mut self, request: FetchRequest) {
        self.log.record(&request);
        let location = request.request_location;
        let outcome = self
            .resources
            .remove(&location)
            .unwrap_or_else(|| Err(FetchError::NotFound {
                location: location.clone(),
            }));
        if self.sender.send(Completion { location, outcome }).is_err() {
            tracing::warn!("completion receiver dropped; request discarded");
        }
    }
}
