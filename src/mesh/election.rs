//! Per-node membership view and election state machine.
//!
//! [`NodeCore`] is synchronous and owns no I/O: every handler receives the
//! sender id of the inbound envelope explicitly and returns the messages the
//! node must broadcast in response. The async runner in
//! [`super::node::MeshNode`] serializes ticks and inbound messages on it.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::correlator::RequestCorrelator;
use super::protocol::{
    ClusterStateRequest, ClusterStateResponse, Heartbeat, MasterElected, MasterVote, Message,
};
use super::types::{MasterCandidate, NodePhase, NodeSnapshot, NodeState};
use crate::config::MeshConfig;
use crate::error::SwarmError;

/// Tunables of the election round.
#[derive(Debug, Clone)]
pub struct ElectionSettings {
    /// Heartbeat period in seconds, also the candidacy age before voting
    pub heartbeat_interval: f64,
    pub merge_cluster_state: bool,
}

impl From<&MeshConfig> for ElectionSettings {
    fn from(config: &MeshConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval_secs,
            merge_cluster_state: config.merge_cluster_state,
        }
    }
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self::from(&MeshConfig::default())
    }
}

/// Outcome of counting a complete set of votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tally {
    Winner(String),
    Tie { candidates: Vec<String>, votes: usize },
}

/// Counts votes per candidate. A single candidate holding the maximum wins,
/// several sharing it tie. `None` when there are no votes.
pub fn tally<'a, I>(votes: I) -> Option<Tally>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for candidate in votes {
        *counts.entry(candidate.as_str()).or_insert(0) += 1;
    }

    let max = counts.values().copied().max()?;
    let mut leaders: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count == max)
        .map(|(candidate, _)| candidate.to_string())
        .collect();

    if leaders.len() == 1 {
        leaders.pop().map(Tally::Winner)
    } else {
        leaders.sort_unstable();
        Some(Tally::Tie {
            candidates: leaders,
            votes: max,
        })
    }
}

#[derive(Debug)]
pub struct NodeCore {
    state: NodeState,
    view: HashMap<String, NodeState>,
    candidates: HashMap<String, MasterCandidate>,
    /// voter id -> candidate id
    votes: HashMap<String, String>,
    correlator: RequestCorrelator,
    settings: ElectionSettings,
}

impl NodeCore {
    pub fn new(node_id: impl Into<String>, now: f64, settings: ElectionSettings) -> Self {
        let state = NodeState::new(node_id, now);
        let view = HashMap::from([(state.node_id.clone(), state.clone())]);

        Self {
            state,
            view,
            candidates: HashMap::new(),
            votes: HashMap::new(),
            correlator: RequestCorrelator::new(),
            settings,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.state.node_id
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn view(&self) -> &HashMap<String, NodeState> {
        &self.view
    }

    pub fn candidates(&self) -> &HashMap<String, MasterCandidate> {
        &self.candidates
    }

    pub fn votes(&self) -> &HashMap<String, String> {
        &self.votes
    }

    pub fn is_master(&self) -> bool {
        self.state.is_master
    }

    pub fn outstanding_requests(&self) -> usize {
        self.correlator.outstanding()
    }

    pub fn master_known(&self) -> bool {
        self.view.values().any(|node| node.is_master)
    }

    pub fn round_open(&self) -> bool {
        !self.candidates.is_empty() || !self.votes.is_empty()
    }

    pub fn phase(&self) -> NodePhase {
        if self.state.is_master {
            NodePhase::Master
        } else if self.master_known() {
            NodePhase::FollowerWithMaster
        } else if self.votes.contains_key(self.node_id()) {
            NodePhase::Voted
        } else if self.candidates.contains_key(self.node_id()) {
            NodePhase::Candidate
        } else {
            NodePhase::FollowerUnknownMaster
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            state: self.state.clone(),
            phase: self.phase(),
            view: self.view.clone(),
            candidates: self.candidates.clone(),
            votes: self.votes.clone(),
            outstanding_requests: self.correlator.outstanding(),
        }
    }

    /// Peers whose last heartbeat is older than `timeout` seconds. Reported
    /// only; the view keeps them.
    pub fn stale_peers(&self, now: f64, timeout: f64) -> Vec<String> {
        let mut stale: Vec<String> = self
            .view
            .values()
            .filter(|node| node.node_id != self.state.node_id && now - node.heartbeat > timeout)
            .map(|node| node.node_id.clone())
            .collect();
        stale.sort_unstable();
        stale
    }

    /// Messages announcing a freshly started node.
    pub fn startup(&mut self) -> Vec<Message> {
        let request = ClusterStateRequest {
            request_id: RequestCorrelator::new_request_id(),
        };
        vec![
            self.send_request(request),
            Message::heartbeat(self.state.clone()),
        ]
    }

    fn send_request(&mut self, request: ClusterStateRequest) -> Message {
        self.correlator.register(request.request_id.clone());
        request.into()
    }

    /// Applies one inbound message from `sender_id`.
    pub fn handle(&mut self, sender_id: &str, message: Message) -> Result<Vec<Message>, SwarmError> {
        match message {
            Message::Heartbeat(heartbeat) => self.on_heartbeat(sender_id, heartbeat),
            Message::ClusterStateRequest(request) => Ok(self.on_cluster_state_request(request)),
            Message::ClusterStateResponse(response) => {
                self.on_cluster_state_response(response);
                Ok(Vec::new())
            }
            Message::MasterCandidate(candidate) => {
                self.on_master_candidate(candidate)?;
                Ok(Vec::new())
            }
            Message::MasterVote(vote) => {
                self.on_master_vote(sender_id, vote);
                Ok(Vec::new())
            }
            Message::MasterElected(elected) => Ok(self.on_master_elected(elected)),
        }
    }

    fn on_heartbeat(&mut self, sender_id: &str, heartbeat: Heartbeat) -> Result<Vec<Message>, SwarmError> {
        let peer = heartbeat.node_state;
        if peer.node_id == self.state.node_id {
            return Err(SwarmError::protocol(format!(
                "heartbeat from {} carries the local node id",
                sender_id
            )));
        }

        debug!(peer = %peer.node_id, is_master = peer.is_master, "Node is alive");
        self.view.insert(peer.node_id.clone(), peer);

        if self.master_known() {
            return Ok(Vec::new());
        }

        Ok(vec![self.nominate().into()])
    }

    /// Own candidacy for the current round, recorded once and repeated
    /// unchanged afterwards.
    fn nominate(&mut self) -> MasterCandidate {
        if let Some(existing) = self.candidates.get(&self.state.node_id) {
            return existing.clone();
        }

        info!("No master found, nominating self");
        let candidate = MasterCandidate::new(self.state.node_id.clone(), self.state.heartbeat);
        self.candidates
            .insert(candidate.node_id.clone(), candidate.clone());
        candidate
    }

    fn on_cluster_state_request(&self, request: ClusterStateRequest) -> Vec<Message> {
        debug!(request_id = %request.request_id, "Received cluster state request");
        vec![Message::ClusterStateResponse(ClusterStateResponse {
            request_id: request.request_id,
            nodes: self.view.clone(),
        })]
    }

    fn on_cluster_state_response(&mut self, response: ClusterStateResponse) {
        let merge = self.settings.merge_cluster_state;
        let view = &mut self.view;

        let handled = self.correlator.on_response(&response, |response| {
            info!(
                request_id = %response.request_id,
                nodes = response.nodes.len(),
                "Received cluster state response"
            );
            if merge {
                for (node_id, state) in &response.nodes {
                    view.entry(node_id.clone()).or_insert_with(|| state.clone());
                }
            }
        });

        if handled.is_none() {
            debug!(request_id = %response.request_id, "Ignoring unmatched cluster state response");
        }
    }

    fn on_master_candidate(&mut self, candidate: MasterCandidate) -> Result<(), SwarmError> {
        if !candidate.timestamp.is_finite() {
            return Err(SwarmError::protocol(format!(
                "candidate {} has a non finite timestamp",
                candidate.node_id
            )));
        }

        debug!(candidate = %candidate.node_id, "Received master candidate");
        self.candidates.insert(candidate.node_id.clone(), candidate);
        Ok(())
    }

    fn on_master_vote(&mut self, sender_id: &str, vote: MasterVote) {
        debug!(voter = %sender_id, candidate = %vote.node_id, "Received master vote");
        self.votes.insert(sender_id.to_string(), vote.node_id);
    }

    fn on_master_elected(&mut self, elected: MasterElected) -> Vec<Message> {
        if self.apply_elected(&elected.elected_node_id) {
            vec![Message::heartbeat(self.state.clone())]
        } else {
            Vec::new()
        }
    }

    /// Ends the round in favour of `winner`. Returns true when the local
    /// node is the winner. Peers learn of a remote winner from its next
    /// heartbeat, never from the election message itself.
    fn apply_elected(&mut self, winner: &str) -> bool {
        self.clear_round();

        if winner == self.state.node_id {
            info!("I am the master");
            self.state.is_master = true;
            self.view
                .insert(self.state.node_id.clone(), self.state.clone());
            true
        } else {
            info!(master = %winner, "Master elected");
            false
        }
    }

    fn clear_round(&mut self) {
        self.candidates.clear();
        self.votes.clear();
    }

    fn earliest_candidate(&self) -> Option<&MasterCandidate> {
        self.candidates.values().min_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        })
    }

    /// Heartbeat tick at wall-clock `now`: refreshes and announces the local
    /// state, then advances an open election round.
    pub fn tick<R: Rng + ?Sized>(&mut self, now: f64, rng: &mut R) -> Vec<Message> {
        self.state.heartbeat = now;
        self.view
            .insert(self.state.node_id.clone(), self.state.clone());

        let mut out = vec![Message::heartbeat(self.state.clone())];
        if !self.master_known() {
            self.advance_election(now, rng, &mut out);
        }
        out
    }

    fn advance_election<R: Rng + ?Sized>(&mut self, now: f64, rng: &mut R, out: &mut Vec<Message>) {
        let Some(earliest) = self.earliest_candidate() else {
            return;
        };
        if now - earliest.timestamp <= self.settings.heartbeat_interval {
            return;
        }

        // One vote per round. Repeating it could leak into the next round
        // on peers that already closed this one.
        if !self.votes.contains_key(&self.state.node_id) {
            let mut ids: Vec<&String> = self.candidates.keys().collect();
            ids.sort_unstable();
            if let Some(choice) = ids.choose(rng).map(|id| (*id).clone()) {
                info!(candidate = %choice, "Sending master vote");
                self.votes
                    .insert(self.state.node_id.clone(), choice.clone());
                out.push(Message::vote(choice));
            }
        }

        if self.votes.len() != self.candidates.len() || self.candidates.len() != self.view.len() {
            debug!(
                votes = self.votes.len(),
                candidates = self.candidates.len(),
                nodes = self.view.len(),
                "Waiting for every node to vote"
            );
            return;
        }

        match tally(self.votes.values()) {
            Some(Tally::Winner(winner)) => {
                info!(master = %winner, "New master");
                out.push(Message::elected(winner.clone()));
                self.apply_elected(&winner);
                out.push(Message::heartbeat(self.state.clone()));
            }
            Some(Tally::Tie { candidates, votes }) => {
                warn!(?candidates, votes, "There was a tie, abandoning round");
                self.clear_round();
            }
            None => self.clear_round(),
        }
    }
}
