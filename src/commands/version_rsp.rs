// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr, SpdmVersion};
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const VERSION_ENTRY_SIZE: usize = 2;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct GetVersionReq {
    // Both parameters are reserved and ignored.
    param1: u8,
    param2: u8,
}

impl CommonCodec for GetVersionReq {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
pub struct VersionRespCommon {
    param1: u8,
    param2: u8,
    reserved: u8,
    version_num_entry_count: u8,
}

impl VersionRespCommon {
    pub fn new(entry_count: u8) -> Self {
        Self {
            param1: 0,
            param2: 0,
            reserved: 0,
            version_num_entry_count: entry_count,
        }
    }
}

impl CommonCodec for VersionRespCommon {}

bitfield! {
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable)]
pub struct VersionNumberEntry(MSB0 [u8]);
impl Debug;
u8;
    pub update_ver, set_update_ver: 3, 0;
    pub alpha, set_alpha: 7, 4;
    pub major, set_major: 11, 8;
    pub minor, set_minor: 15, 12;
}

impl VersionNumberEntry<[u8; VERSION_ENTRY_SIZE]> {
    pub fn new(version: SpdmVersion) -> Self {
        let mut entry = VersionNumberEntry([0u8; VERSION_ENTRY_SIZE]);
        entry.set_major(version.major());
        entry.set_minor(version.minor());
        entry
    }
}

impl CommonCodec for VersionNumberEntry<[u8; VERSION_ENTRY_SIZE]> {}

fn fill_version_response(
    rsp_buf: &mut MessageBuf,
    supported_versions: &[SpdmVersion],
) -> CommandResult<()> {
    let spdm_hdr = SpdmMsgHdr::new(SpdmVersion::V10, ReqRespCode::Version);
    spdm_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let resp_common = VersionRespCommon::new(supported_versions.len() as u8);
    resp_common
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    for &version in supported_versions.iter() {
        let entry = VersionNumberEntry::new(version);
        entry
            .encode(rsp_buf)
            .map_err(|_| (false, CommandError::BufferTooSmall))?;
    }
    Ok(())
}

pub(crate) fn handle_get_version(
    ctx: &mut SpdmContext,
    spdm_hdr: SpdmMsgHdr,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    // GET_VERSION is always carried on version 1.0.
    match spdm_hdr.version() {
        Ok(SpdmVersion::V10) => {}
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::VersionMismatch, 0, None))?,
    }

    ctx.response_state_gate(ReqRespCode::GetVersion, spdm_hdr.raw_code(), rsp_buf)?;

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != core::mem::size_of::<GetVersionReq>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let _get_version_req =
        GetVersionReq::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    // A new version exchange restarts the connection from scratch.
    ctx.reset();

    fill_version_response(rsp_buf, ctx.supported_versions)?;

    ctx.transcript
        .append(TranscriptContext::A, req)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    ctx.transcript
        .append(TranscriptContext::A, rsp_buf.message())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    ctx.state
        .connection_info
        .set_state(ConnectionState::AfterVersion);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_entry_layout() {
        let entry = VersionNumberEntry::new(SpdmVersion::V12);
        // Low byte carries update/alpha, high byte major/minor.
        assert_eq!(entry.0, [0x00, 0x12]);
    }

    #[test]
    fn test_fill_version_response_layout() {
        let mut raw = [0u8; 16];
        let mut rsp_buf = MessageBuf::new(&mut raw);
        let versions = [SpdmVersion::V10, SpdmVersion::V11, SpdmVersion::V12];

        fill_version_response(&mut rsp_buf, &versions).unwrap();
        assert_eq!(rsp_buf.msg_len(), 2 + 4 + versions.len() * VERSION_ENTRY_SIZE);
        assert_eq!(raw[0], 0x10);
        assert_eq!(raw[1], u8::from(ReqRespCode::Version));
        assert_eq!(raw[5], 3);
        assert_eq!(&raw[6..12], &[0x00, 0x10, 0x00, 0x11, 0x00, 0x12]);
    }
}
