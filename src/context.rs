// Licensed under the Apache-2.0 license

//! Responder context and request dispatch. The context owns every piece of
//! connection, session and transcript state; handlers are the only mutators
//! and run to completion on the caller's thread.

use crate::cert_store::LocalCertStore;
use crate::codec::{Codec, MessageBuf, MessageReader};
use crate::commands::error_rsp::{
    encode_error_response, ErrorCode, ResponseNotReadyExt,
};
use crate::commands::{
    algorithms_rsp, capabilities_rsp, certificate_rsp, challenge_auth_rsp, digests_rsp,
    end_session_rsp, finish_rsp, heartbeat_rsp, key_exchange_rsp, key_update_rsp,
    measurements_rsp, psk_exchange_rsp, psk_finish_rsp, vendor_defined_rsp, version_rsp,
};
use crate::crypto::{CryptoProvider, CryptoResult};
use crate::error::*;
use crate::measurements::{LocalMeasurements, MeasurementBlock};
use crate::protocol::*;
use crate::session::SessionManager;
use crate::state::{ConnectionState, ResponseState, State};
use crate::transcript::{SessionTranscriptContext, Transcript, TranscriptContext};
use crate::vdm::VdmResponder;
use log::{debug, warn};
use zerocopy::IntoBytes;

// Defaults reported in a ResponseNotReady error.
const DEFAULT_RDT_EXPONENT: u8 = 20;
const DEFAULT_RDTM: u8 = 2;

pub struct SpdmContext<'a> {
    pub(crate) supported_versions: &'a [SpdmVersion],
    pub(crate) state: State,
    pub(crate) local_capabilities: DeviceCapabilities,
    pub(crate) local_algorithms: LocalDeviceAlgorithms<'a>,
    pub(crate) cert_store: LocalCertStore<'a>,
    pub(crate) measurements: LocalMeasurements<'a>,
    pub(crate) crypto: &'a mut dyn CryptoProvider,
    pub(crate) vdm_responder: Option<&'a mut dyn VdmResponder>,
    pub(crate) transcript: Transcript,
    pub(crate) session_mgr: SessionManager,
    request_session_id: Option<u32>,
}

impl<'a> SpdmContext<'a> {
    pub fn new(
        supported_versions: &'a [SpdmVersion],
        local_capabilities: DeviceCapabilities,
        local_algorithms: LocalDeviceAlgorithms<'a>,
        crypto: &'a mut dyn CryptoProvider,
    ) -> SpdmResult<Self> {
        validate_supported_versions(supported_versions)?;
        validate_device_algorithms(&local_algorithms)?;

        Ok(Self {
            supported_versions,
            state: State::new(),
            local_capabilities,
            local_algorithms,
            cert_store: LocalCertStore::new(),
            measurements: LocalMeasurements::new(),
            crypto,
            vdm_responder: None,
            transcript: Transcript::new(),
            session_mgr: SessionManager::new(),
            request_session_id: None,
        })
    }

    /// Installs the certificate chain blob served from `slot_id`. Policy
    /// calls this before the first GET_CERTIFICATE; the core never parses the
    /// bytes.
    pub fn provision_cert_chain(&mut self, slot_id: u8, cert_chain: &'a [u8]) -> SpdmResult<()> {
        self.cert_store.provision(slot_id, cert_chain)
    }

    /// Installs one measurement block for GET_MEASUREMENTS.
    pub fn provision_measurement(&mut self, block: MeasurementBlock<'a>) -> SpdmResult<()> {
        self.measurements.provision(block)
    }

    pub fn set_vdm_responder(&mut self, responder: &'a mut dyn VdmResponder) {
        self.vdm_responder = Some(responder);
    }

    /// Transport glue: records which secure session, if any, the next request
    /// arrived on. Consumed by the next `handle_request` call.
    pub fn set_request_session_id(&mut self, session_id: Option<u32>) {
        self.request_session_id = session_id;
    }

    pub fn set_response_state(&mut self, response_state: ResponseState) {
        self.state.set_response_state(response_state);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_info.state()
    }

    /// Drops all connection, transcript and session state back to power-on.
    pub fn reset(&mut self) {
        for session_id in self.session_mgr.active_session_ids() {
            self.crypto.release_session(session_id);
        }
        self.session_mgr.reset();
        self.transcript.reset();
        self.state.reset();
    }

    /// Dispatches one framed request and materializes the response in `rsp`.
    ///
    /// A protocol error is a successful dispatch: the ERROR response is in
    /// `rsp` and the returned length covers it. A core error (`Err`) means
    /// the output buffer holds no transmittable message; any partial bytes in
    /// it are retained but must not be sent.
    pub fn handle_request(&mut self, req: &[u8], rsp: &mut [u8]) -> SpdmResult<usize> {
        let mut rsp_buf = MessageBuf::new(rsp);
        let session_id = self.request_session_id.take();

        let mut reader = MessageReader::new(req);
        let hdr = SpdmMsgHdr::decode(&mut reader).map_err(SpdmError::Codec)?;

        let req_code = match hdr.req_resp_code().and_then(|c| {
            c.response_code()?;
            Ok(c)
        }) {
            Ok(code) => code,
            Err(_) => {
                warn!("unsupported request code 0x{:02x}", hdr.raw_code());
                let (rsp_ready, err) = self.generate_error_response(
                    &mut rsp_buf,
                    ErrorCode::UnsupportedRequest,
                    hdr.raw_code(),
                    None,
                );
                debug_assert!(rsp_ready);
                let _ = err;
                return Ok(rsp_buf.msg_len());
            }
        };

        debug!(
            "dispatch 0x{:02x} session={:?} state={:?}",
            hdr.raw_code(),
            session_id,
            self.state.connection_info.state()
        );

        let result = match req_code {
            ReqRespCode::GetVersion => {
                version_rsp::handle_get_version(self, hdr, req, &mut rsp_buf)
            }
            ReqRespCode::GetCapabilities => {
                capabilities_rsp::handle_get_capabilities(self, hdr, req, &mut rsp_buf)
            }
            ReqRespCode::NegotiateAlgorithms => {
                algorithms_rsp::handle_negotiate_algorithms(self, hdr, req, &mut rsp_buf)
            }
            ReqRespCode::GetDigests => {
                digests_rsp::handle_get_digests(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::GetCertificate => {
                certificate_rsp::handle_get_certificate(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::Challenge => {
                challenge_auth_rsp::handle_challenge(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::GetMeasurements => {
                measurements_rsp::handle_get_measurements(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::KeyExchange => {
                key_exchange_rsp::handle_key_exchange(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::Finish => {
                finish_rsp::handle_finish(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::PskExchange => {
                psk_exchange_rsp::handle_psk_exchange(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::PskFinish => {
                psk_finish_rsp::handle_psk_finish(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::Heartbeat => {
                heartbeat_rsp::handle_heartbeat(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::KeyUpdate => {
                key_update_rsp::handle_key_update(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::EndSession => {
                end_session_rsp::handle_end_session(self, hdr, req, &mut rsp_buf, session_id)
            }
            ReqRespCode::VendorDefinedRequest => {
                vendor_defined_rsp::handle_vendor_defined(self, hdr, req, &mut rsp_buf, session_id)
            }
            _ => Err((
                true,
                self.generate_error_response(
                    &mut rsp_buf,
                    ErrorCode::UnsupportedRequest,
                    hdr.raw_code(),
                    None,
                )
                .1,
            )),
        };

        match result {
            Ok(()) => Ok(rsp_buf.msg_len()),
            Err((true, command_error)) => {
                warn!("request 0x{:02x}: {}", hdr.raw_code(), command_error);
                Ok(rsp_buf.msg_len())
            }
            Err((false, command_error)) => Err(SpdmError::Command(command_error)),
        }
    }

    /// Replaces whatever is in `rsp_buf` with a protocol ERROR response.
    /// Used as a tail call by the handlers.
    pub(crate) fn generate_error_response(
        &self,
        rsp_buf: &mut MessageBuf,
        error_code: ErrorCode,
        error_data: u8,
        extended_data: Option<&[u8]>,
    ) -> (bool, CommandError) {
        rsp_buf.reset();
        let spdm_version = self.state.connection_info.version_number();
        encode_error_response(rsp_buf, spdm_version, error_code, error_data, extended_data)
    }

    /// Non-Normal response states answer for the handler. Returns `Ok` when
    /// the handler may proceed (Normal, or a resynchronizing GET_VERSION).
    pub(crate) fn response_state_gate(
        &mut self,
        req_code: ReqRespCode,
        raw_code: u8,
        rsp_buf: &mut MessageBuf,
    ) -> CommandResult<()> {
        match self.state.response_state() {
            ResponseState::Normal => Ok(()),
            ResponseState::Busy => {
                Err(self.generate_error_response(rsp_buf, ErrorCode::Busy, 0, None))
            }
            ResponseState::NeedResync => {
                if req_code == ReqRespCode::GetVersion {
                    self.state.set_response_state(ResponseState::Normal);
                    return Ok(());
                }
                let err = self.generate_error_response(rsp_buf, ErrorCode::RequestResynch, 0, None);
                // The requester is expected to restart with GET_VERSION.
                self.state
                    .connection_info
                    .set_state(ConnectionState::NotStarted);
                Err(err)
            }
            ResponseState::ProcessingEncap => {
                Err(self.generate_error_response(rsp_buf, ErrorCode::RequestInFlight, 0, None))
            }
            ResponseState::NotReady => {
                let ext = ResponseNotReadyExt {
                    rdt_exponent: DEFAULT_RDT_EXPONENT,
                    request_code: raw_code,
                    token: self.state.next_not_ready_token(),
                    rdtm: DEFAULT_RDTM,
                };
                Err(self.generate_error_response(
                    rsp_buf,
                    ErrorCode::ResponseNotReady,
                    0,
                    Some(ext.as_bytes()),
                ))
            }
        }
    }

    /// Transcript resets forced by the incoming opcode: sub-phase restarts
    /// clear the logs the restarted phase will rebuild.
    pub(crate) fn reset_transcripts_via_request_code(&mut self, req_code: ReqRespCode) {
        if req_code != ReqRespCode::GetMeasurements {
            self.transcript.reset_context(TranscriptContext::M);
        }
        match req_code {
            ReqRespCode::KeyExchange
            | ReqRespCode::GetMeasurements
            | ReqRespCode::Finish
            | ReqRespCode::PskExchange
            | ReqRespCode::PskFinish
            | ReqRespCode::KeyUpdate
            | ReqRespCode::Heartbeat
            | ReqRespCode::EndSession => {
                if self.state.connection_info.state() < ConnectionState::Authenticated {
                    self.transcript.reset_context(TranscriptContext::B);
                    self.transcript.reset_context(TranscriptContext::C);
                }
            }
            ReqRespCode::GetDigests => {
                self.transcript.reset_context(TranscriptContext::B);
            }
            _ => {}
        }
    }

    pub(crate) fn negotiated_algorithms(&self) -> Option<SelectedAlgorithms> {
        self.state.connection_info.selected_algorithms().copied()
    }

    /// Digest of the provisioned chain in `slot_id` under the negotiated
    /// hash.
    pub(crate) fn cert_chain_digest(
        &mut self,
        slot_id: u8,
        hash_type: BaseHashAlgoType,
    ) -> CryptoResult<SpdmDigest> {
        let chain = self
            .cert_store
            .chain(slot_id)
            .unwrap_or(&[]);
        let mut digest = SpdmDigest::default();
        self.crypto.hash_all(hash_type, chain, &mut digest)?;
        Ok(digest)
    }

    /// M1 hash: A ‖ B ‖ C, bound into CHALLENGE_AUTH signatures.
    pub(crate) fn m1_hash(&mut self, hash_type: BaseHashAlgoType) -> CryptoResult<SpdmDigest> {
        self.crypto.hash_init(hash_type)?;
        self.crypto
            .hash_update(self.transcript.message(TranscriptContext::A))?;
        self.crypto
            .hash_update(self.transcript.message(TranscriptContext::B))?;
        self.crypto
            .hash_update(self.transcript.message(TranscriptContext::C))?;
        let mut digest = SpdmDigest::default();
        self.crypto.hash_final(&mut digest)?;
        Ok(digest)
    }

    /// L1 hash: A ‖ M from 1.2 on, M alone before that. Bound into signed
    /// MEASUREMENTS responses.
    pub(crate) fn l1_hash(&mut self, hash_type: BaseHashAlgoType) -> CryptoResult<SpdmDigest> {
        self.crypto.hash_init(hash_type)?;
        if self.state.connection_info.version_number() >= SpdmVersion::V12 {
            self.crypto
                .hash_update(self.transcript.message(TranscriptContext::A))?;
        }
        self.crypto
            .hash_update(self.transcript.message(TranscriptContext::M))?;
        let mut digest = SpdmDigest::default();
        self.crypto.hash_final(&mut digest)?;
        Ok(digest)
    }

    /// Session transcript hash: A ‖ chain digest ‖ K, plus F once the finish
    /// leg is in flight. Feeds the session signature, the finished-key HMACs
    /// and the key-schedule derivations.
    pub(crate) fn th_hash(
        &mut self,
        session_id: u32,
        hash_type: BaseHashAlgoType,
        include_f: bool,
    ) -> CommandResult<SpdmDigest> {
        let session_info = self
            .session_mgr
            .session_info(session_id)
            .map_err(|e| (false, CommandError::Session(e)))?;
        let slot_id = session_info.slot_id;

        let cert_digest = if self.cert_store.chain(slot_id).is_some() {
            let mut digest = SpdmDigest::default();
            let chain = self.cert_store.chain(slot_id).unwrap_or(&[]);
            self.crypto
                .hash_all(hash_type, chain, &mut digest)
                .map_err(|e| (false, CommandError::Crypto(e)))?;
            digest
        } else {
            SpdmDigest::default()
        };

        self.crypto
            .hash_init(hash_type)
            .map_err(|e| (false, CommandError::Crypto(e)))?;
        self.crypto
            .hash_update(self.transcript.message(TranscriptContext::A))
            .map_err(|e| (false, CommandError::Crypto(e)))?;
        self.crypto
            .hash_update(cert_digest.as_ref())
            .map_err(|e| (false, CommandError::Crypto(e)))?;

        let session_info = self
            .session_mgr
            .session_info(session_id)
            .map_err(|e| (false, CommandError::Session(e)))?;
        let message_k = session_info
            .session_transcript
            .message(SessionTranscriptContext::K);
        self.crypto
            .hash_update(message_k)
            .map_err(|e| (false, CommandError::Crypto(e)))?;
        if include_f {
            let session_info = self
                .session_mgr
                .session_info(session_id)
                .map_err(|e| (false, CommandError::Session(e)))?;
            let message_f = session_info
                .session_transcript
                .message(SessionTranscriptContext::F);
            self.crypto
                .hash_update(message_f)
                .map_err(|e| (false, CommandError::Crypto(e)))?;
        }

        let mut digest = SpdmDigest::default();
        self.crypto
            .hash_final(&mut digest)
            .map_err(|e| (false, CommandError::Crypto(e)))?;
        Ok(digest)
    }

    /// Appends to a session transcript, mapping overflow into the handler
    /// plane.
    pub(crate) fn append_session_transcript(
        &mut self,
        session_id: u32,
        context: SessionTranscriptContext,
        data: &[u8],
    ) -> CommandResult<()> {
        let session_info = self
            .session_mgr
            .session_info_mut(session_id)
            .map_err(|e| (false, CommandError::Session(e)))?;
        session_info
            .session_transcript
            .append(context, data)
            .map_err(|e| (false, CommandError::Transcript(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::error_rsp::ErrorCode;
    use crate::testutil::*;

    #[test]
    fn test_unknown_opcode_yields_unsupported_request() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();

        let mut rsp = [0u8; 64];
        // 0x42 is not an SPDM request code.
        let len = ctx.handle_request(&[0x10, 0x42, 0, 0], &mut rsp).unwrap();
        assert_eq!(len, 4);
        assert_eq!(rsp[1], u8::from(ReqRespCode::Error));
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
        assert_eq!(rsp[3], 0x42);
    }

    #[test]
    fn test_response_opcode_as_request_is_rejected() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();

        let mut rsp = [0u8; 64];
        let len = ctx.handle_request(&[0x10, 0x04, 0, 0], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
        assert_eq!(rsp[3], 0x04);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_vca_advances_connection_state() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();

        assert_eq!(ctx.connection_state(), ConnectionState::NotStarted);
        negotiate(&mut ctx);
        assert_eq!(
            ctx.connection_state(),
            ConnectionState::AlgorithmsNegotiated
        );
        assert!(ctx.negotiated_algorithms().is_some());
        assert!(ctx.transcript.size(crate::transcript::TranscriptContext::A) > 0);
    }

    #[test]
    fn test_get_version_resets_connection() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 64];
        let len = ctx.handle_request(&get_version_request(), &mut rsp).unwrap();
        assert_eq!(rsp[1], u8::from(ReqRespCode::Version));
        assert!(len > 4);
        assert_eq!(ctx.connection_state(), ConnectionState::AfterVersion);
        assert!(ctx.negotiated_algorithms().is_none());
    }

    #[test]
    fn test_busy_state_short_circuits() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);
        ctx.set_response_state(ResponseState::Busy);

        let mut rsp = [0u8; 64];
        let req = [0x12, 0x81, 0, 0];
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::Busy));
        // The state is application-driven; it stays busy.
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::Busy));
    }

    #[test]
    fn test_need_resync_answers_resynch_then_accepts_get_version() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);
        ctx.set_response_state(ResponseState::NeedResync);

        let mut rsp = [0u8; 64];
        ctx.handle_request(&[0x12, 0x81, 0, 0], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::RequestResynch));
        assert_eq!(ctx.connection_state(), ConnectionState::NotStarted);

        // GET_VERSION clears the resynchronization request.
        let len = ctx.handle_request(&get_version_request(), &mut rsp).unwrap();
        assert_eq!(rsp[1], u8::from(ReqRespCode::Version));
        assert!(len > 4);
        assert_eq!(ctx.state.response_state(), ResponseState::Normal);
    }

    #[test]
    fn test_not_ready_carries_extended_payload() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);
        ctx.set_response_state(ResponseState::NotReady);

        let mut rsp = [0u8; 64];
        let len = ctx.handle_request(&[0x12, 0x81, 0, 0], &mut rsp).unwrap();
        assert_eq!(len, 8);
        assert_eq!(rsp[2], u8::from(ErrorCode::ResponseNotReady));
        assert_eq!(rsp[4], DEFAULT_RDT_EXPONENT);
        assert_eq!(rsp[5], 0x81);
        assert_eq!(rsp[7], DEFAULT_RDTM);
    }

    #[test]
    fn test_version_mismatch_takes_precedence_over_busy() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);
        ctx.set_response_state(ResponseState::Busy);

        let mut rsp = [0u8; 64];
        // Negotiated 1.2, request claims 1.1.
        ctx.handle_request(&[0x11, 0x81, 0, 0], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::VersionMismatch));
    }

    #[test]
    fn test_capability_gate_reports_offending_opcode() {
        let mut crypto = MockCryptoProvider::new();
        let mut local_capabilities = test_local_capabilities();
        local_capabilities.flags.set_cert_cap(0);
        // Without certificates there is no challenge either.
        local_capabilities.flags.set_chal_cap(0);
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            local_capabilities,
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 64];
        // GET_CERTIFICATE without CERT_CAP
        ctx.handle_request(&[0x12, 0x82, 0, 0, 0, 0, 64, 0], &mut rsp)
            .unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
        assert_eq!(rsp[3], 0x82);
    }

    #[test]
    fn test_transcripts_reset_by_request_code() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);

        ctx.transcript
            .append(TranscriptContext::B, &[1, 2, 3])
            .unwrap();
        ctx.transcript
            .append(TranscriptContext::C, &[4, 5])
            .unwrap();
        ctx.transcript.append(TranscriptContext::M, &[6]).unwrap();

        ctx.reset_transcripts_via_request_code(ReqRespCode::GetCertificate);
        assert_eq!(ctx.transcript.size(TranscriptContext::B), 3);
        assert_eq!(ctx.transcript.size(TranscriptContext::M), 0);

        ctx.transcript.append(TranscriptContext::M, &[6]).unwrap();
        ctx.reset_transcripts_via_request_code(ReqRespCode::GetMeasurements);
        assert_eq!(ctx.transcript.size(TranscriptContext::M), 1);
        assert_eq!(ctx.transcript.size(TranscriptContext::B), 0);
        assert_eq!(ctx.transcript.size(TranscriptContext::C), 0);
    }

    #[test]
    fn test_core_error_on_truncated_header() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();

        let mut rsp = [0u8; 64];
        assert!(ctx.handle_request(&[0x10], &mut rsp).is_err());
    }
}
