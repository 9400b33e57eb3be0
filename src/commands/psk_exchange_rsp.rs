// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::challenge_auth_rsp::{encode_measurement_summary_hash, MEAS_SUMMARY_NONE};
use crate::commands::error_rsp::ErrorCode;
use crate::config::{MAX_OPAQUE_DATA_SIZE, MAX_PSK_CONTEXT_SIZE, MAX_PSK_HINT_SIZE};
use crate::context::SpdmContext;
use crate::crypto::SessionKeyUsage;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{MeasCapability, PskCapability, ReqRespCode, SpdmDigest, SpdmMsgHdr};
use crate::session::{SessionPolicy, SessionState, SessionType};
use crate::state::ConnectionState;
use crate::transcript::SessionTranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const PSK_RESPONDER_CONTEXT_LEN: usize = 32;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct PskExchangeReqBase {
    meas_summary_hash_type: u8,
    // Session policy from 1.2 on, reserved before.
    session_policy: u8,
    req_session_id: u16,
    psk_hint_len: u16,
    context_len: u16,
    opaque_len: u16,
}

impl CommonCodec for PskExchangeReqBase {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct PskExchangeRspBase {
    heartbeat_period: u8,
    reserved: u8,
    rsp_session_id: u16,
    reserved2: u16,
    context_len: u16,
    opaque_len: u16,
}

impl CommonCodec for PskExchangeRspBase {}

#[allow(clippy::too_many_arguments)]
fn generate_psk_exchange_response(
    ctx: &mut SpdmContext,
    session_id: u32,
    rsp_session_id: u16,
    meas_summary_hash_type: u8,
    psk_hint: &[u8],
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    let hash_type = match ctx.negotiated_algorithms() {
        Some(selected) => selected.base_hash,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };

    ctx.append_session_transcript(session_id, SessionTranscriptContext::K, req)?;

    // An unknown hint is the peer's problem, not an internal failure.
    if ctx.crypto.psk_derive(session_id, psk_hint).is_err() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let mut responder_context = [0u8; PSK_RESPONDER_CONTEXT_LEN];
    ctx.crypto
        .get_random(&mut responder_context)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let connection_version = ctx.state.connection_info.version_number();
    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::PskExchangeRsp);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let rsp_base = PskExchangeRspBase {
        heartbeat_period: 0,
        reserved: 0,
        rsp_session_id,
        reserved2: 0,
        context_len: PSK_RESPONDER_CONTEXT_LEN as u16,
        opaque_len: 0,
    };
    rsp_base
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    if meas_summary_hash_type != MEAS_SUMMARY_NONE {
        encode_measurement_summary_hash(ctx, hash_type, meas_summary_hash_type, rsp_buf)?;
    }

    rsp_buf
        .put_data(PSK_RESPONDER_CONTEXT_LEN)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&responder_context);

    // Verify data covers the transcript up to this point.
    ctx.append_session_transcript(session_id, SessionTranscriptContext::K, rsp_buf.message())?;
    let th1_digest = ctx.th_hash(session_id, hash_type, false)?;

    ctx.crypto
        .derive_handshake_secrets(session_id, th1_digest.as_ref())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let mut verify_data = SpdmDigest::default();
    ctx.crypto
        .session_hmac(
            session_id,
            SessionKeyUsage::ResponseFinishedKey,
            th1_digest.as_ref(),
            &mut verify_data,
        )
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    rsp_buf
        .put_data(verify_data.as_ref().len())
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(verify_data.as_ref());
    ctx.append_session_transcript(session_id, SessionTranscriptContext::K, verify_data.as_ref())?;

    Ok(())
}

pub(crate) fn handle_psk_exchange(
    ctx: &mut SpdmContext,
    spdm_hdr: SpdmMsgHdr,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
    session_id: Option<u32>,
) -> CommandResult<()> {
    let connection_version = ctx.state.connection_info.version_number();
    if spdm_hdr.version().ok() != Some(connection_version) {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::VersionMismatch, 0, None))?;
    }

    ctx.response_state_gate(ReqRespCode::PskExchange, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    if session_id.is_some() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let local_psk_cap = ctx.local_capabilities.flags.psk_cap();
    let peer_psk_cap = ctx
        .state
        .connection_info
        .peer_capabilities()
        .flags
        .psk_cap();
    if local_psk_cap == PskCapability::NoPsk as u8 || peer_psk_cap == PskCapability::NoPsk as u8 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() < core::mem::size_of::<PskExchangeReqBase>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let req_base =
        PskExchangeReqBase::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    let psk_hint_len = req_base.psk_hint_len as usize;
    let context_len = req_base.context_len as usize;
    let opaque_len = req_base.opaque_len as usize;
    if psk_hint_len > MAX_PSK_HINT_SIZE
        || context_len > MAX_PSK_CONTEXT_SIZE
        || opaque_len > MAX_OPAQUE_DATA_SIZE
        || reader.remaining() != psk_hint_len + context_len + opaque_len
    {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let psk_hint = reader
        .take(psk_hint_len)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    let meas_summary_hash_type = req_base.meas_summary_hash_type;
    if meas_summary_hash_type != MEAS_SUMMARY_NONE
        && ctx.local_capabilities.flags.meas_cap() == MeasCapability::NoMeasurement as u8
    {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let (new_session_id, rsp_session_id) =
        ctx.session_mgr.generate_session_id(req_base.req_session_id);
    if ctx.session_mgr.create_session(new_session_id).is_err() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::SessionLimitExceeded, 0, None))?;
    }
    if let Ok(session_info) = ctx.session_mgr.session_info_mut(new_session_id) {
        session_info.init(
            SessionPolicy(req_base.session_policy),
            SessionType::MacAndEncrypt,
            0,
        );
    }

    ctx.reset_transcripts_via_request_code(ReqRespCode::PskExchange);

    let result = generate_psk_exchange_response(
        ctx,
        new_session_id,
        rsp_session_id,
        meas_summary_hash_type,
        psk_hint,
        req,
        rsp_buf,
    );
    if let Err(e) = result {
        ctx.crypto.release_session(new_session_id);
        let _ = ctx.session_mgr.delete_session(new_session_id);
        return Err(e);
    }

    // Without a PSK context round, the session is live immediately.
    if local_psk_cap == PskCapability::PskWithContext as u8 {
        if let Ok(session_info) = ctx.session_mgr.session_info_mut(new_session_id) {
            session_info.set_session_state(SessionState::Handshaking);
        }
    } else {
        let hash_type = match ctx.negotiated_algorithms() {
            Some(selected) => selected.base_hash,
            None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
        };
        let th2_digest = ctx.th_hash(new_session_id, hash_type, false)?;
        ctx.crypto
            .derive_data_secrets(new_session_id, th2_digest.as_ref())
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        if let Ok(session_info) = ctx.session_mgr.session_info_mut(new_session_id) {
            session_info.set_session_state(SessionState::Established);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_u16;
    use crate::context::SpdmContext;
    use crate::crypto::SessionKeyUsage;
    use crate::testutil::*;
    use sha2::{Digest, Sha384};

    fn psk_exchange_request(hint: &[u8]) -> Vec<u8> {
        let mut req = vec![0x12, 0xE6, 0x00, 0x00];
        req.extend_from_slice(&0xCAFEu16.to_le_bytes());
        req.extend_from_slice(&(hint.len() as u16).to_le_bytes());
        req.extend_from_slice(&16u16.to_le_bytes()); // requester context
        req.extend_from_slice(&0u16.to_le_bytes()); // opaque
        req.extend_from_slice(hint);
        req.extend_from_slice(&[0x77; 16]);
        req
    }

    #[test]
    fn test_psk_exchange_then_finish() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        let vca = negotiate_with_transcript(&mut ctx);

        let mut rsp = [0u8; 2048];
        let psk_req = psk_exchange_request(b"vendor-psk-0");
        let len = ctx.handle_request(&psk_req, &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x66, "unexpected {:02x?}", &rsp[..len.min(8)]);

        let session_id = (u32::from(read_u16(&rsp[4..6])) << 16) | 0xCAFE;
        assert_eq!(
            ctx.session_mgr
                .session_info(session_id)
                .unwrap()
                .session_state,
            SessionState::Handshaking
        );

        let mut message_k = psk_req.clone();
        message_k.extend_from_slice(&rsp[..len]);

        let finish_base = [0x12u8, 0xE7, 0x00, 0x00];
        let mut th_input = Vec::new();
        th_input.extend_from_slice(&vca);
        th_input.extend_from_slice(&message_k);
        th_input.extend_from_slice(&finish_base);
        let th: [u8; 48] = Sha384::digest(&th_input).into();
        let verify_data =
            MockCryptoProvider::expected_hmac(SessionKeyUsage::RequestFinishedKey, &th);

        let mut finish_req = finish_base.to_vec();
        finish_req.extend_from_slice(&verify_data);
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&finish_req, &mut rsp).unwrap();
        assert_eq!(&rsp[..len], &[0x12, 0x67, 0x00, 0x00]);
        assert_eq!(
            ctx.session_mgr
                .session_info(session_id)
                .unwrap()
                .session_state,
            SessionState::Established
        );
    }

    #[test]
    fn test_unknown_psk_hint_fails_without_leaking_session() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let psk_req = psk_exchange_request(UNKNOWN_PSK_HINT);
        ctx.handle_request(&psk_req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
        assert!(ctx.session_mgr.active_session_ids().is_empty());
    }
}
