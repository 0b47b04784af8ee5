use std::collections::HashSet;
use uuid::Uuid;

use super::protocol::Response;

/// Matches broadcast responses to the requests this node sent.
///
/// Delivery to the handler is at most once per request id. Ids are never
/// expired, so a request whose response is lost stays outstanding.
#[derive(Debug, Default, Clone)]
pub struct RequestCorrelator {
    outstanding: HashSet<String>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_request_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Records a request id before its request is broadcast.
    pub fn register(&mut self, request_id: impl Into<String>) {
        self.outstanding.insert(request_id.into());
    }

    /// Runs `handler` if `response` answers an outstanding request, consuming
    /// the id. Unsolicited and duplicate responses return `None`.
    pub fn on_response<R, F, T>(&mut self, response: &R, handler: F) -> Option<T>
    where
        R: Response,
        F: FnOnce(&R) -> T,
    {
        if self.outstanding.remove(response.request_id()) {
            Some(handler(response))
        } else {
            None
        }
    }

    pub fn is_outstanding(&self, request_id: &str) -> bool {
        self.outstanding.contains(request_id)
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::protocol::ClusterStateResponse;
    use std::collections::HashMap;

    fn response(id: &str) -> ClusterStateResponse {
        ClusterStateResponse {
            request_id: id.to_string(),
            nodes: HashMap::new(),
        }
    }

    #[test]
    fn test_handler_runs_once_per_request() {
        let mut correlator = RequestCorrelator::new();
        let id = RequestCorrelator::new_request_id();
        correlator.register(id.clone());

        let mut calls = 0;
        assert_eq!(correlator.on_response(&response(&id), |_| calls += 1), Some(()));
        assert_eq!(correlator.on_response(&response(&id), |_| calls += 1), None);
        assert_eq!(calls, 1);
        assert!(!correlator.is_outstanding(&id));
    }

    #[test]
    fn test_unsolicited_response_is_ignored() {
        let mut correlator = RequestCorrelator::new();
        correlator.register("mine");

        let mut calls = 0;
        assert!(correlator.on_response(&response("theirs"), |_| calls += 1).is_none());
        assert_eq!(calls, 0);
        assert_eq!(correlator.outstanding(), 1);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| RequestCorrelator::new_request_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
