// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const KEY_UPDATE_OP_UPDATE_KEY: u8 = 1;
const KEY_UPDATE_OP_UPDATE_ALL_KEYS: u8 = 2;
const KEY_UPDATE_OP_VERIFY_NEW_KEY: u8 = 3;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct KeyUpdateReq {
    key_operation: u8,
    tag: u8,
}

impl CommonCodec for KeyUpdateReq {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct KeyUpdateAck {
    key_operation: u8,
    tag: u8,
}

impl CommonCodec for KeyUpdateAck {}

pub(crate) fn handle_key_update(
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

    ctx.response_state_gate(ReqRespCode::KeyUpdate, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let local_flags = ctx.local_capabilities.flags;
    let peer_flags = ctx.state.connection_info.peer_capabilities().flags;
    if local_flags.key_upd_cap() == 0 || peer_flags.key_upd_cap() == 0 {
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
    if reader.remaining() != core::mem::size_of::<KeyUpdateReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let key_update_req =
        KeyUpdateReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    ctx.reset_transcripts_via_request_code(ReqRespCode::KeyUpdate);

    match key_update_req.key_operation {
        KEY_UPDATE_OP_UPDATE_KEY => {
            ctx.crypto
                .update_session_key(session_id, false)
                .map_err(|_| {
                    ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None)
                })?;
        }
        KEY_UPDATE_OP_UPDATE_ALL_KEYS => {
            ctx.crypto
                .update_session_key(session_id, true)
                .map_err(|_| {
                    ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None)
                })?;
        }
        KEY_UPDATE_OP_VERIFY_NEW_KEY => {}
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?,
    }

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::KeyUpdateAck);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    KeyUpdateAck {
        key_operation: key_update_req.key_operation,
        tag: key_update_req.tag,
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
    fn test_invalid_key_operation() {
        let chain = [0xC5u8; 64];
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &chain).unwrap();
        let vca = negotiate_with_transcript(&mut ctx);
        let session_id = establish_session(&mut ctx, &vca, &chain);

        let mut rsp = [0u8; 64];
        ctx.set_request_session_id(Some(session_id));
        ctx.handle_request(&[0x12, 0xE9, 4, 0], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
    }

    #[test]
    fn test_verify_new_key_acks_without_rolling() {
        let chain = [0xC5u8; 64];
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &chain).unwrap();
        let vca = negotiate_with_transcript(&mut ctx);
        let session_id = establish_session(&mut ctx, &vca, &chain);

        let mut rsp = [0u8; 64];
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&[0x12, 0xE9, 3, 9], &mut rsp).unwrap();
        assert_eq!(&rsp[..len], &[0x12, 0x69, 3, 9]);
    }
}
