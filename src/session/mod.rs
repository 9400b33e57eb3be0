// Licensed under the Apache-2.0 license

//! Bounded secure-session table. Session ids are flat 32-bit values formed
//! from the responder half and the requester half; lookup is linear over the
//! fixed-size slot array.

use crate::config::MAX_NUM_SESSIONS;
use arrayvec::ArrayVec;
use thiserror::Error;

pub mod info;

pub(crate) use info::{SessionInfo, SessionPolicy, SessionState, SessionType};

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("session table full")]
    SessionsLimitReached,
    #[error("invalid session id")]
    InvalidSessionId,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Default)]
pub(crate) struct SessionManager {
    sessions: [Option<SessionInfo>; MAX_NUM_SESSIONS],
    cur_responder_session_id: u16,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: [const { None }; MAX_NUM_SESSIONS],
            cur_responder_session_id: 0,
        }
    }

    pub fn reset(&mut self) {
        self.sessions = [const { None }; MAX_NUM_SESSIONS];
        self.cur_responder_session_id = 0;
    }

    /// Allocates the next full session id for a requester-proposed half.
    pub fn generate_session_id(&mut self, requester_session_id: u16) -> (u32, u16) {
        let rsp_session_id = self.cur_responder_session_id;
        let session_id = (u32::from(rsp_session_id) << 16) | u32::from(requester_session_id);
        self.cur_responder_session_id = self.cur_responder_session_id.wrapping_add(1);
        (session_id, rsp_session_id)
    }

    pub fn create_session(&mut self, session_id: u32) -> SessionResult<()> {
        for slot in self.sessions.iter_mut() {
            if slot.is_none() {
                *slot = Some(SessionInfo::new(session_id));
                return Ok(());
            }
        }
        Err(SessionError::SessionsLimitReached)
    }

    pub fn delete_session(&mut self, session_id: u32) -> SessionResult<()> {
        let index = self
            .sessions
            .iter()
            .position(|s| {
                s.as_ref()
                    .map(|info| info.session_id == session_id)
                    .unwrap_or(false)
            })
            .ok_or(SessionError::InvalidSessionId)?;
        self.sessions[index] = None;
        Ok(())
    }

    pub fn session_info(&self, session_id: u32) -> SessionResult<&SessionInfo> {
        self.sessions
            .iter()
            .find_map(|s| s.as_ref().filter(|info| info.session_id == session_id))
            .ok_or(SessionError::InvalidSessionId)
    }

    pub fn session_info_mut(&mut self, session_id: u32) -> SessionResult<&mut SessionInfo> {
        self.sessions
            .iter_mut()
            .find_map(|s| s.as_mut().filter(|info| info.session_id == session_id))
            .ok_or(SessionError::InvalidSessionId)
    }

    /// The session waiting on its finish leg, if any. Used when the finish
    /// message legitimately arrives outside the session (clear handshake).
    pub fn handshaking_session_id(&self) -> Option<u32> {
        self.sessions.iter().find_map(|s| {
            s.as_ref()
                .filter(|info| info.session_state == SessionState::Handshaking)
                .map(|info| info.session_id)
        })
    }

    pub fn active_session_ids(&self) -> ArrayVec<u32, MAX_NUM_SESSIONS> {
        self.sessions
            .iter()
            .filter_map(|s| s.as_ref().map(|info| info.session_id))
            .collect()
    }
}
