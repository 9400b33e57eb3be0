// Licensed under the Apache-2.0 license

use crate::cert_store::SLOT_ID_MASK;
use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::config::{MAX_CERT_CHAIN_BLOCK_LEN, MAX_CERT_CHAIN_SLOTS};
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct GetCertificateReq {
    param1: u8,
    param2: u8,
    offset: u16,
    length: u16,
}

impl CommonCodec for GetCertificateReq {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct GetCertificateRespCommon {
    slot_id: u8,
    param2: u8,
    portion_length: u16,
    remainder_length: u16,
}

impl CommonCodec for GetCertificateRespCommon {}

pub(crate) fn handle_get_certificate(
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

    ctx.response_state_gate(ReqRespCode::GetCertificate, spdm_hdr.raw_code(), rsp_buf)?;

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
    if reader.remaining() != core::mem::size_of::<GetCertificateReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let get_cert_req =
        GetCertificateReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    // High bits of param1 are reserved: mask, never reject.
    let slot_id = get_cert_req.param1 & SLOT_ID_MASK;
    if slot_id as usize >= MAX_CERT_CHAIN_SLOTS {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let cert_chain = match ctx.cert_store.chain(slot_id) {
        Some(chain) => chain,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?,
    };
    let chain_size = cert_chain.len() as u16;

    let offset = get_cert_req.offset;
    let mut length = get_cert_req.length;

    if length == 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    if offset >= chain_size {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    // Without chunking on both sides, one response is capped at the block
    // length. The clamp is silent; portion_length tells the requester what it
    // actually got.
    let chunk_supported = ctx.local_capabilities.flags.chunk_cap() != 0
        && ctx
            .state
            .connection_info
            .peer_capabilities()
            .flags
            .chunk_cap()
            != 0;
    if !chunk_supported && length > MAX_CERT_CHAIN_BLOCK_LEN as u16 {
        length = MAX_CERT_CHAIN_BLOCK_LEN as u16;
    }
    if length > chain_size - offset {
        length = chain_size - offset;
    }
    let portion_length = length;
    let remainder_length = chain_size - (length + offset);

    ctx.reset_transcripts_via_request_code(ReqRespCode::GetCertificate);

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::Certificate);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let resp_common = GetCertificateRespCommon {
        slot_id,
        param2: 0,
        portion_length,
        remainder_length,
    };
    resp_common
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    rsp_buf
        .put_data(portion_length as usize)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&cert_chain[offset as usize..(offset + portion_length) as usize]);

    // Cache the exchange for signature binding, request before response.
    // Session-scoped retrieval stays out of message_b.
    if session_id.is_none() {
        ctx.transcript
            .append(TranscriptContext::B, req)
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        ctx.transcript
            .append(TranscriptContext::B, rsp_buf.message())
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }

    if ctx.state.connection_info.state() < ConnectionState::AfterCertificate {
        ctx.state
            .connection_info
            .set_state(ConnectionState::AfterCertificate);
    }
    Ok(())
}
