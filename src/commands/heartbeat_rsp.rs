// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct HeartbeatReq {
    reserved0: u8,
    reserved1: u8,
}

impl CommonCodec for HeartbeatReq {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct HeartbeatAck {
    reserved0: u8,
    reserved1: u8,
}

impl CommonCodec for HeartbeatAck {}

pub(crate) fn handle_heartbeat(
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

    ctx.response_state_gate(ReqRespCode::Heartbeat, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let local_flags = ctx.local_capabilities.flags;
    let peer_flags = ctx.state.connection_info.peer_capabilities().flags;
    if local_flags.hbeat_cap() == 0 || peer_flags.hbeat_cap() == 0 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
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
    if reader.remaining() != core::mem::size_of::<HeartbeatReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let _heartbeat_req =
        HeartbeatReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    ctx.reset_transcripts_via_request_code(ReqRespCode::Heartbeat);

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::HeartbeatAck);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    HeartbeatAck {
        reserved0: 0,
        reserved1: 0,
    }
    .encode(rsp_buf)
    .map_err(|_| (false, CommandError::BufferTooSmall))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::error_rsp::ErrorCode;
    use crate::context::SpdmContext;
    use crate::testutil::*;

    #[test]
    fn test_heartbeat_needs_capability_on_both_sides() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();

        let mut rsp = [0u8; 64];
        ctx.handle_request(&get_version_request(), &mut rsp).unwrap();

        let mut flags = test_requester_flags();
        flags.set_hbeat_cap(0);
        let req = get_capabilities_request(0x12, flags);
        ctx.handle_request(&req, &mut rsp).unwrap();
        let req = negotiate_algorithms_request(0x12);
        ctx.handle_request(&req, &mut rsp).unwrap();

        ctx.handle_request(&[0x12, 0xE8, 0, 0], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
        assert_eq!(rsp[3], 0xE8);
    }
}
