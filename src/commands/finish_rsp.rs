// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::commands::key_exchange_rsp::handshake_in_the_clear;
use crate::context::SpdmContext;
use crate::crypto::SessionKeyUsage;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmDigest, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use crate::transcript::SessionTranscriptContext;
use constant_time_eq::constant_time_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const FINISH_REQ_SIGNATURE_INCLUDED: u8 = 0x01;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct FinishReqBase {
    req_attr: u8,
    req_slot_id: u8,
}

impl CommonCodec for FinishReqBase {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct FinishRspBase {
    reserved0: u8,
    reserved1: u8,
}

impl CommonCodec for FinishRspBase {}

pub(crate) fn handle_finish(
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

    ctx.response_state_gate(ReqRespCode::Finish, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let local_flags = ctx.local_capabilities.flags;
    let peer_flags = ctx.state.connection_info.peer_capabilities().flags;
    if local_flags.key_ex_cap() == 0 || peer_flags.key_ex_cap() == 0 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    // FINISH rides the handshaking session, or arrives in the clear when both
    // sides negotiated that.
    let session_id = match session_id {
        Some(session_id) => session_id,
        None => {
            if !handshake_in_the_clear(ctx) {
                Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
            }
            match ctx.session_mgr.handshaking_session_id() {
                Some(session_id) => session_id,
                None => Err(ctx.generate_error_response(
                    rsp_buf,
                    ErrorCode::UnexpectedRequest,
                    0,
                    None,
                ))?,
            }
        }
    };
    match ctx.session_mgr.session_info(session_id) {
        Ok(info) if info.session_state == SessionState::Handshaking => {}
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
    }

    let hash_type = match ctx.negotiated_algorithms() {
        Some(selected) => selected.base_hash,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };
    let hash_size = hash_type.digest_size();

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != core::mem::size_of::<FinishReqBase>() + hash_size {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let finish_req =
        FinishReqBase::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    // Session-based mutual authentication is not offered.
    if finish_req.req_attr & FINISH_REQ_SIGNATURE_INCLUDED != 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let requester_verify_data = reader
        .take(hash_size)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    ctx.reset_transcripts_via_request_code(ReqRespCode::Finish);

    // The requester's verify data covers the transcript up to, but not
    // including, itself.
    ctx.append_session_transcript(session_id, SessionTranscriptContext::F, &req[..4])?;

    let th_digest = ctx.th_hash(session_id, hash_type, true)?;
    let mut expected = SpdmDigest::default();
    ctx.crypto
        .session_hmac(
            session_id,
            SessionKeyUsage::RequestFinishedKey,
            th_digest.as_ref(),
            &mut expected,
        )
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    if !constant_time_eq(expected.as_ref(), requester_verify_data) {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::DecryptError, 0, None))?;
    }

    ctx.append_session_transcript(
        session_id,
        SessionTranscriptContext::F,
        requester_verify_data,
    )?;

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::FinishRsp);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    FinishRspBase {
        reserved0: 0,
        reserved1: 0,
    }
    .encode(rsp_buf)
    .map_err(|_| (false, CommandError::BufferTooSmall))?;

    ctx.append_session_transcript(session_id, SessionTranscriptContext::F, rsp_buf.message())?;

    // In-the-clear handshakes carry responder verify data in the response.
    if handshake_in_the_clear(ctx) {
        let th_digest = ctx.th_hash(session_id, hash_type, true)?;
        let mut responder_verify_data = SpdmDigest::default();
        ctx.crypto
            .session_hmac(
                session_id,
                SessionKeyUsage::ResponseFinishedKey,
                th_digest.as_ref(),
                &mut responder_verify_data,
            )
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        rsp_buf
            .put_data(responder_verify_data.as_ref().len())
            .map_err(|_| (false, CommandError::BufferTooSmall))?
            .copy_from_slice(responder_verify_data.as_ref());
        ctx.append_session_transcript(
            session_id,
            SessionTranscriptContext::F,
            responder_verify_data.as_ref(),
        )?;
    }

    let th2_digest = ctx.th_hash(session_id, hash_type, true)?;
    ctx.crypto
        .derive_data_secrets(session_id, th2_digest.as_ref())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    if let Ok(session_info) = ctx.session_mgr.session_info_mut(session_id) {
        session_info.set_session_state(SessionState::Established);
    }
    Ok(())
}
