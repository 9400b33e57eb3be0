// Licensed under the Apache-2.0 license

use crate::protocol::{
    DeviceAlgorithms, DeviceCapabilities, SelectedAlgorithms, SpdmVersion,
};

/// Responder-side phase of the pre-session handshake. Advances only through
/// the dispatcher; never retreats on an error path.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub enum ConnectionState {
    NotStarted,
    AfterVersion,
    AfterCapabilities,
    AlgorithmsNegotiated,
    AfterDigest,
    AfterCertificate,
    Authenticated,
}

/// Application-driven gate over normal request processing. Anything other
/// than `Normal` makes every handler answer with the matching protocol error
/// instead of running its body.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ResponseState {
    Normal,
    Busy,
    NeedResync,
    ProcessingEncap,
    NotReady,
}

pub(crate) struct State {
    pub(crate) connection_info: ConnectionInfo,
    response_state: ResponseState,
    not_ready_token: u8,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            connection_info: ConnectionInfo::default(),
            response_state: ResponseState::Normal,
            not_ready_token: 0,
        }
    }

    pub fn reset(&mut self) {
        self.connection_info.reset();
        self.response_state = ResponseState::Normal;
    }

    pub fn response_state(&self) -> ResponseState {
        self.response_state
    }

    pub fn set_response_state(&mut self, response_state: ResponseState) {
        self.response_state = response_state;
    }

    /// Token reported in ResponseNotReady; a fresh one per deferred request.
    pub fn next_not_ready_token(&mut self) -> u8 {
        let token = self.not_ready_token;
        self.not_ready_token = self.not_ready_token.wrapping_add(1);
        token
    }
}

pub(crate) struct ConnectionInfo {
    version_number: SpdmVersion,
    state: ConnectionState,
    peer_capabilities: DeviceCapabilities,
    peer_algorithms: DeviceAlgorithms,
    selected_algorithms: Option<SelectedAlgorithms>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            version_number: SpdmVersion::default(),
            state: ConnectionState::NotStarted,
            peer_capabilities: DeviceCapabilities::default(),
            peer_algorithms: DeviceAlgorithms::default(),
            selected_algorithms: None,
        }
    }
}

impl ConnectionInfo {
    pub fn version_number(&self) -> SpdmVersion {
        self.version_number
    }

    pub fn set_version_number(&mut self, version_number: SpdmVersion) {
        self.version_number = version_number;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn peer_capabilities(&self) -> DeviceCapabilities {
        self.peer_capabilities
    }

    pub fn set_peer_capabilities(&mut self, peer_capabilities: DeviceCapabilities) {
        self.peer_capabilities = peer_capabilities;
    }

    #[allow(dead_code)]
    pub fn peer_algorithms(&self) -> &DeviceAlgorithms {
        &self.peer_algorithms
    }

    pub fn set_peer_algorithms(&mut self, peer_algorithms: DeviceAlgorithms) {
        self.peer_algorithms = peer_algorithms;
    }

    pub fn selected_algorithms(&self) -> Option<&SelectedAlgorithms> {
        self.selected_algorithms.as_ref()
    }

    pub fn set_selected_algorithms(&mut self, selected: SelectedAlgorithms) {
        self.selected_algorithms = Some(selected);
    }

    fn reset(&mut self) {
        self.version_number = SpdmVersion::default();
        self.state = ConnectionState::NotStarted;
        self.peer_capabilities = DeviceCapabilities::default();
        self.peer_algorithms = DeviceAlgorithms::default();
        self.selected_algorithms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_ordering() {
        assert!(ConnectionState::NotStarted < ConnectionState::AfterVersion);
        assert!(ConnectionState::AlgorithmsNegotiated < ConnectionState::AfterCertificate);
        assert!(ConnectionState::AfterCertificate < ConnectionState::Authenticated);
    }

    #[test]
    fn test_state_reset_returns_to_initial() {
        let mut state = State::new();
        state.connection_info.set_state(ConnectionState::AfterCertificate);
        state.set_response_state(ResponseState::Busy);

        state.reset();
        assert_eq!(state.connection_info.state(), ConnectionState::NotStarted);
        assert_eq!(state.response_state(), ResponseState::Normal);
    }

    #[test]
    fn test_not_ready_token_increments() {
        let mut state = State::new();
        let first = state.next_not_ready_token();
        let second = state.next_not_ready_token();
        assert_ne!(first, second);
    }
}
