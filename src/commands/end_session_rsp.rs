// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

bitfield! {
    #[derive(FromBytes, IntoBytes, Immutable)]
    #[repr(C)]
    struct EndSessionReqAttr(u8);
    impl Debug;
    u8;
    pub negotiated_state_cleaning_indicator, _: 0, 0;
    reserved, _: 7, 1;
}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct EndSessionReq {
    req_attr: EndSessionReqAttr,
    reserved: u8,
}

impl CommonCodec for EndSessionReq {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct EndSessionAck {
    reserved0: u8,
    reserved1: u8,
}

impl CommonCodec for EndSessionAck {}

pub(crate) fn handle_end_session(
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

    ctx.response_state_gate(ReqRespCode::EndSession, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let session_id = match session_id {
        Some(session_id) => session_id,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::SessionRequired, 0, None))?,
    };
    match ctx.session_mgr.session_info(session_id) {
        Ok(info) if info.session_state == SessionState::Established => {}
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != core::mem::size_of::<EndSessionReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let _end_session_req =
        EndSessionReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    ctx.reset_transcripts_via_request_code(ReqRespCode::EndSession);

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::EndSessionAck);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    EndSessionAck {
        reserved0: 0,
        reserved1: 0,
    }
    .encode(rsp_buf)
    .map_err(|_| (false, CommandError::BufferTooSmall))?;

    // The ACK is materialized; the session and its keys go away with it.
    ctx.crypto.release_session(session_id);
    ctx.session_mgr
        .delete_session(session_id)
        .map_err(|e| (false, CommandError::Session(e)))?;
    Ok(())
}
