// Licensed under the Apache-2.0 license

use crate::transcript::SessionTranscript;
use bitfield::bitfield;

bitfield! {
    #[derive(Clone, Copy, Default)]
    pub struct SessionPolicy(u8);
    impl Debug;
    u8;
    pub termination_policy, _: 0, 0;
    pub event_all_policy, _: 1, 1;
    reserved, _: 7, 2;
}

/// Secured-message phase of one session.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SessionState {
    /// Allocated but no handshake message processed yet.
    NotStarted,
    /// KEY_EXCHANGE or PSK_EXCHANGE answered, waiting for the finish leg.
    Handshaking,
    /// Finish leg verified; application traffic may flow.
    Established,
}

/// Protection negotiated for the session's record layer.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SessionType {
    None,
    MacOnly,
    MacAndEncrypt,
}

#[allow(dead_code)]
#[derive(Debug)]
pub(crate) struct SessionInfo {
    pub(crate) session_id: u32,
    pub(crate) session_policy: SessionPolicy,
    pub(crate) session_state: SessionState,
    pub(crate) session_type: SessionType,
    /// Certificate slot the session was keyed against; signs nothing after
    /// the handshake but FINISH needs it for the transcript hash.
    pub(crate) slot_id: u8,
    pub(crate) session_transcript: SessionTranscript,
}

impl SessionInfo {
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id,
            session_policy: SessionPolicy::default(),
            session_state: SessionState::NotStarted,
            session_type: SessionType::None,
            slot_id: 0,
            session_transcript: SessionTranscript::new(),
        }
    }

    pub fn init(&mut self, session_policy: SessionPolicy, session_type: SessionType, slot_id: u8) {
        self.session_policy = session_policy;
        self.session_state = SessionState::NotStarted;
        self.session_type = session_type;
        self.slot_id = slot_id;
    }

    pub fn set_session_state(&mut self, state: SessionState) {
        self.session_state = state;
    }
}
