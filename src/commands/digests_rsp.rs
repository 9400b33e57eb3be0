// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::config::MAX_CERT_CHAIN_SLOTS;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr, SpdmVersion};
use crate::session::SessionState;
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(FromBytes, IntoBytes, Immutable, Default)]
#[repr(C)]
struct GetDigestsReq {
    param1: u8,
    param2: u8,
}

impl CommonCodec for GetDigestsReq {}

#[derive(FromBytes, IntoBytes, Immutable, Default)]
#[repr(C)]
struct GetDigestsRespCommon {
    supported_slot_mask: u8,
    provisioned_slot_mask: u8,
}

impl CommonCodec for GetDigestsRespCommon {}

pub(crate) fn handle_get_digests(
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

    ctx.response_state_gate(ReqRespCode::GetDigests, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    if let Some(session_id) = session_id {
        match ctx.session_mgr.session_info(session_id) {
            Ok(info) if info.session_state == SessionState::Established => {}
            _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
        }
    }

    if ctx.local_capabilities.flags.cert_cap() == 0 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != core::mem::size_of::<GetDigestsReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let _get_digests_req =
        GetDigestsReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    let hash_type = match ctx.negotiated_algorithms() {
        Some(selected) => selected.base_hash,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };

    ctx.reset_transcripts_via_request_code(ReqRespCode::GetDigests);

    let (supported_slot_mask, provisioned_slot_mask) = ctx.cert_store.slot_masks();

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::Digests);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let resp_common = GetDigestsRespCommon {
        // The supported mask is only defined from 1.3 on.
        supported_slot_mask: if connection_version >= SpdmVersion::V13 {
            supported_slot_mask
        } else {
            0
        },
        provisioned_slot_mask,
    };
    resp_common
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    for slot_id in 0..MAX_CERT_CHAIN_SLOTS as u8 {
        if provisioned_slot_mask & (1 << slot_id) == 0 {
            continue;
        }
        let digest = ctx
            .cert_chain_digest(slot_id, hash_type)
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        rsp_buf
            .put_data(digest.as_ref().len())
            .map_err(|_| (false, CommandError::BufferTooSmall))?
            .copy_from_slice(digest.as_ref());
    }

    if session_id.is_none() {
        ctx.transcript
            .append(TranscriptContext::B, req)
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        ctx.transcript
            .append(TranscriptContext::B, rsp_buf.message())
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }

    if ctx.state.connection_info.state() < ConnectionState::AfterDigest {
        ctx.state
            .connection_info
            .set_state(ConnectionState::AfterDigest);
    }
    Ok(())
}
