//! Playback session state machine
//!
//! Decides, for every intercepted request, whether it starts a new session,
//! cancels as a re-fired duplicate, or passes through untouched. Each
//! activation gets a fresh generation number; background work tags its
//! results with that number so stale deliveries can be dropped.

use crate::{request::PlaybackRequest, types::CancelPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Background fetches launched for the active request
    Activated,
    /// Request dropped or closed by the user
    Cancelled,
    /// Manifest delivered in full
    Completed,
    /// Manifest task failed
    Errored,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Activated) | (Idle, Cancelled) |
            (Activated, Activated) | (Activated, Cancelled) | (Activated, Completed) | (Activated, Errored) |
            (Cancelled, Activated) | (Cancelled, Cancelled) | (Cancelled, Idle) |
            (Completed, Activated) | (Completed, Cancelled) | (Completed, Idle) |
            (Errored, Activated) | (Errored, Cancelled) | (Errored, Idle)
        )
    }

    /// True for states that end an activation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Completed | SessionState::Errored
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Activated => write!(f, "activated"),
            SessionState::Cancelled => write!(f, "cancelled"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Errored => write!(f, "errored"),
        }
    }
}

/// Outcome of evaluating a request against the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not a playback request; leave it to the transport
    PassThrough,
    /// Re-fired request; `false_call` tells the sink to go back to its prior screen
    Cancel { false_call: bool },
    /// New session under `generation`
    Activate { generation: u64 },
}

impl Decision {
    pub fn is_activate(&self) -> bool {
        matches!(self, Decision::Activate { .. })
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, Decision::Cancel { .. })
    }
}

type IdPair = (Option<String>, Option<String>);

fn owned_pair(request: &PlaybackRequest) -> IdPair {
    let (video, playlist) = request.id_pair();
    (video.map(str::to_owned), playlist.map(str::to_owned))
}

/// Session record owned by one interceptor
#[derive(Debug, Default)]
pub struct Session {
    /// Id pair of the last activation
    active: Option<IdPair>,
    /// Id pair the user closed last
    closed: Option<IdPair>,
    is_open: bool,
    generation: u64,
    state: SessionState,
    continue_requested: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn active_video_id(&self) -> Option<&str> {
        self.active.as_ref().and_then(|(v, _)| v.as_deref())
    }

    pub fn active_playlist_id(&self) -> Option<&str> {
        self.active.as_ref().and_then(|(_, p)| p.as_deref())
    }

    fn set_state(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
    }

    /// Evaluate `request` and apply the resulting transition.
    ///
    /// The same id pair arriving again before the sink reported open is a
    /// re-fired navigation and is cancelled, unless the user asked for the
    /// next video. Everything else activates.
    pub fn decide(&mut self, request: &PlaybackRequest, policy: CancelPolicy) -> Decision {
        let pair = owned_pair(request);

        let duplicate =
            self.active.as_ref() == Some(&pair) && !self.is_open && !self.continue_requested;
        let closed_replay = policy == CancelPolicy::DuplicateOrClosed
            && self.closed.as_ref() == Some(&pair)
            && !self.continue_requested;

        if duplicate || closed_replay {
            let false_call = self.is_open;
            self.is_open = false;
            self.set_state(SessionState::Cancelled);
            info!(
                video_id = ?pair.0,
                playlist_id = ?pair.1,
                false_call,
                "Request cancelled"
            );
            return Decision::Cancel { false_call };
        }

        self.generation += 1;
        self.active = Some(pair);
        self.closed = None;
        self.continue_requested = false;
        self.set_state(SessionState::Activated);

        info!(
            generation = self.generation,
            video_id = ?self.active_video_id(),
            playlist_id = ?self.active_playlist_id(),
            "Session activated"
        );

        Decision::Activate { generation: self.generation }
    }

    /// Start a fresh activation for the pair already active
    pub fn reactivate(&mut self) -> u64 {
        self.generation += 1;
        self.continue_requested = false;
        self.set_state(SessionState::Activated);
        self.generation
    }

    /// The sink reported its first frame
    pub fn on_open(&mut self) {
        self.is_open = true;
    }

    /// The sink went away
    pub fn on_closed(&mut self) {
        self.is_open = false;
        if self.state.is_terminal() {
            self.set_state(SessionState::Idle);
        }
    }

    /// User closed the video
    pub fn on_cancel(&mut self) {
        self.is_open = false;
        self.continue_requested = false;
        self.closed = self.active.clone();
        self.set_state(SessionState::Cancelled);
    }

    /// User asked for the next video; the next request activates even if it repeats ids
    pub fn on_continue(&mut self) {
        self.continue_requested = true;
    }

    /// Manifest task for `generation` finished. Ignored when stale.
    pub fn complete(&mut self, generation: u64) -> bool {
        self.finish(generation, SessionState::Completed)
    }

    /// Manifest task for `generation` failed. Ignored when stale.
    pub fn fail(&mut self, generation: u64) -> bool {
        self.finish(generation, SessionState::Errored)
    }

    fn finish(&mut self, generation: u64, next: SessionState) -> bool {
        if generation != self.generation || self.state != SessionState::Activated {
            return false;
        }
        self.set_state(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(video: &str, list: Option<&str>) -> PlaybackRequest {
        let mut url = format!("https://h/get_video_info?video_id={}", video);
        if let Some(list) = list {
            url.push_str(&format!("&list={}", list));
        }
        PlaybackRequest::parse(url)
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.generation(), 0);
        assert!(!session.is_open());
    }

    #[test]
    fn test_first_request_activates() {
        let mut session = Session::new();
        let decision = session.decide(&req("V1", None), CancelPolicy::Duplicate);
        assert_eq!(decision, Decision::Activate { generation: 1 });
        assert_eq!(session.state(), SessionState::Activated);
        assert_eq!(session.active_video_id(), Some("V1"));
    }

    #[test]
    fn test_first_request_without_ids_activates() {
        let mut session = Session::new();
        let decision = session.decide(&PlaybackRequest::parse("https://h/x"), CancelPolicy::Duplicate);
        assert!(decision.is_activate());
    }

    #[test]
    fn test_duplicate_before_open_cancels() {
        let mut session = Session::new();
        session.decide(&req("V1", Some("L1")), CancelPolicy::Duplicate);
        let decision = session.decide(&req("V1", Some("L1")), CancelPolicy::Duplicate);
        assert_eq!(decision, Decision::Cancel { false_call: false });
        assert_eq!(session.generation(), 1);
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[test]
    fn test_duplicate_after_open_activates() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        session.on_open();
        let decision = session.decide(&req("V1", None), CancelPolicy::Duplicate);
        assert_eq!(decision, Decision::Activate { generation: 2 });
    }

    #[test]
    fn test_playlist_difference_activates() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        let decision = session.decide(&req("V1", Some("L1")), CancelPolicy::Duplicate);
        assert!(decision.is_activate());
    }

    #[test]
    fn test_continue_allows_duplicate_once() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        session.on_continue();
        assert!(session.decide(&req("V1", None), CancelPolicy::Duplicate).is_activate());
        assert!(session.decide(&req("V1", None), CancelPolicy::Duplicate).is_cancel());
    }

    #[test]
    fn test_generation_strictly_increases() {
        let mut session = Session::new();
        let mut last = 0;
        for i in 0..50 {
            let id = format!("V{}", i % 3);
            if let Decision::Activate { generation } = session.decide(&req(&id, None), CancelPolicy::Duplicate) {
                assert!(generation > last);
                last = generation;
            }
            if i % 2 == 0 {
                session.on_open();
            }
        }
        assert_eq!(session.generation(), last);
    }

    #[test]
    fn test_closed_replay_policy() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::DuplicateOrClosed);
        session.on_open();
        session.on_cancel();
        assert!(!session.is_open());

        // sink became visible again before the re-fired request arrived
        session.on_open();
        let decision = session.decide(&req("V1", None), CancelPolicy::DuplicateOrClosed);
        assert_eq!(decision, Decision::Cancel { false_call: true });
        assert!(!session.is_open());

        // default policy only looks at duplicates
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        session.on_cancel();
        session.on_open();
        assert!(session.decide(&req("V1", None), CancelPolicy::Duplicate).is_activate());
    }

    #[test]
    fn test_complete_ignores_stale_generation() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        session.decide(&req("V2", None), CancelPolicy::Duplicate);
        assert!(!session.complete(1));
        assert_eq!(session.state(), SessionState::Activated);
        assert!(session.fail(2));
        assert_eq!(session.state(), SessionState::Errored);
        assert!(!session.complete(2));
    }

    #[test]
    fn test_closed_returns_to_idle() {
        let mut session = Session::new();
        session.decide(&req("V1", None), CancelPolicy::Duplicate);
        session.on_cancel();
        session.on_closed();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_state_transitions() {
        assert!(SessionState::Idle.can_transition_to(SessionState::Activated));
        assert!(SessionState::Activated.can_transition_to(SessionState::Completed));
        assert!(SessionState::Errored.can_transition_to(SessionState::Idle));
        assert!(!SessionState::Idle.can_transition_to(SessionState::Completed));
        assert!(!SessionState::Activated.can_transition_to(SessionState::Idle));
    }
}
