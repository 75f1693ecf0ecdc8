//! Fetch bookkeeping: which request locations are in flight, which completed,
//! and which nodes wait on each.

use std::collections::{HashMap, HashSet};

use crate::graph::ModuleId;
use crate::transport::FetchRequest;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FetchStart {
    /// Nothing to request (empty location or already fetched): load directly.
    Ready,
    /// Already in flight; the node was added to the waiters.
    Joined,
    /// Newly in flight; the caller must dispatch a request.
    Dispatch,
}

#[derive(Default)]
pub(crate) struct FetchState {
    fetching: HashSet<String>,
    fetched: HashSet<String>,
    waiting: HashMap<String, Vec<ModuleId>>,
}

impl FetchState {
    pub fn begin(&mut self, request_location: &str, module: ModuleId) -> FetchStart {
        if request_location.is_empty() || self.fetched.contains(request_location) {
            return FetchStart::Ready;
        }
        if self.fetching.contains(request_location) {
            self.waiting
                .entry(request_location.to_string())
                .or_default()
                .push(module);
            return FetchStart::Joined;
        }
        self.fetching.insert(request_location.to_string());
        self.waiting.insert(request_location.to_string(), vec![module]);
        FetchStart::Dispatch
    }

    /// Mark `request_location` done and drain its waiters, first requester
    /// first. `None` if it was not in flight.
    pub fn finish(&mut self, request_location: &str) -> Option<Vec<ModuleId>> {
        if !self.fetching.remove(request_location) {
            return None;
        }
        self.fetched.insert(request_location.to_string());
        Some(self.waiting.remove(request_location).unwrap_or_default())
    }

    pub fn in_flight(&self) -> usize {
        self.fetching.len()
    }

    pub fn is_fetched(&self, request_location: &str) -> bool {
        self.fetched.contains(request_location)
    }
}

/// Requests discovered while walking one node's dependencies. They are sent
/// together once the walk is over.
#[derive(Default)]
pub(crate) struct RequestBatch {
    requests: Vec<FetchRequest>,
}

impl RequestBatch {
    pub fn push(&mut self, request: FetchRequest) {
        if !self
            .requests
            .iter()
            .any(|r| r.request_location == request.request_location)
        {
            self.requests.push(request);
        }
    }

    pub fn into_requests(self) -> Vec<FetchRequest> {
        self.requests
    }
}
