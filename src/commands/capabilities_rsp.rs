// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::capabilities::*;
use crate::protocol::{ReqRespCode, SpdmMsgHdr, SpdmVersion};
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(FromBytes, IntoBytes, Immutable, Default)]
#[repr(C)]
struct GetCapabilitiesBase {
    param1: u8,
    param2: u8,
}

impl CommonCodec for GetCapabilitiesBase {}

#[derive(FromBytes, IntoBytes, Immutable, Default)]
#[repr(C, packed)]
struct GetCapabilitiesV11 {
    reserved: u8,
    ct_exponent: u8,
    reserved2: u8,
    reserved3: u8,
    flags: CapabilityFlags,
}

impl GetCapabilitiesV11 {
    fn new(ct_exponent: u8, flags: CapabilityFlags) -> Self {
        Self {
            reserved: 0,
            ct_exponent,
            reserved2: 0,
            reserved3: 0,
            flags,
        }
    }
}

impl CommonCodec for GetCapabilitiesV11 {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct GetCapabilitiesV12 {
    data_transfer_size: u32,
    max_spdm_msg_size: u32,
}

impl CommonCodec for GetCapabilitiesV12 {}

fn req_flag_compatible(version: SpdmVersion, flags: &CapabilityFlags) -> bool {
    // Checks common to 1.1 and higher
    if version >= SpdmVersion::V11 {
        // Illegal to return reserved values (2 and 3)
        if flags.psk_cap() >= PskCapability::PskWithContext as u8 {
            return false;
        }

        // Checks that originate from key exchange capabilities
        if flags.key_ex_cap() == 1 || flags.psk_cap() != PskCapability::NoPsk as u8 {
            if flags.mac_cap() == 0 && flags.encrypt_cap() == 0 {
                return false;
            }
        } else {
            if flags.mac_cap() == 1
                || flags.encrypt_cap() == 1
                || flags.handshake_in_the_clear_cap() == 1
                || flags.hbeat_cap() == 1
                || flags.key_upd_cap() == 1
            {
                return false;
            }

            if version >= SpdmVersion::V13 && flags.event_cap() == 1 {
                return false;
            }
        }

        if flags.key_ex_cap() == 0
            && flags.psk_cap() == PskCapability::PskWithNoContext as u8
            && flags.handshake_in_the_clear_cap() == 1
        {
            return false;
        }

        // Checks that originate from certificate or public key capabilities
        if flags.cert_cap() == 1 || flags.pub_key_id_cap() == 1 {
            // Certificate capabilities and public key capabilities can not both be set
            if flags.cert_cap() == 1 && flags.pub_key_id_cap() == 1 {
                return false;
            }

            if flags.chal_cap() == 0 && flags.pub_key_id_cap() == 1 {
                return false;
            }
        } else {
            // If certificates or public keys are not enabled then these capabilities are not allowed
            if flags.chal_cap() == 1 || flags.mut_auth_cap() == 1 {
                return false;
            }

            if version >= SpdmVersion::V13
                && flags.ep_info_cap() == EpInfoCapability::EpInfoWithSignature as u8
            {
                return false;
            }
        }

        // Checks that originate from mutual authentication capabilities
        if flags.mut_auth_cap() == 1 && flags.cert_cap() == 0 && flags.pub_key_id_cap() == 0 {
            return false;
        }
    }

    // Checks specific to 1.1
    if version == SpdmVersion::V11 && flags.mut_auth_cap() == 1 && flags.encap_cap() == 0 {
        return false;
    }

    // Checks specific to 1.3 and higher
    if version >= SpdmVersion::V13 {
        // Illegal to return reserved values
        if flags.ep_info_cap() == EpInfoCapability::Reserved as u8 || flags.multi_key_cap() == 3 {
            return false;
        }

        if flags.multi_key_cap() != 0 && flags.pub_key_id_cap() == 1 {
            return false;
        }
    }

    true
}

fn process_get_capabilities(
    ctx: &mut SpdmContext,
    version: SpdmVersion,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    let expected_len = match version {
        SpdmVersion::V10 => core::mem::size_of::<GetCapabilitiesBase>(),
        SpdmVersion::V11 => {
            core::mem::size_of::<GetCapabilitiesBase>() + core::mem::size_of::<GetCapabilitiesV11>()
        }
        _ => {
            core::mem::size_of::<GetCapabilitiesBase>()
                + core::mem::size_of::<GetCapabilitiesV11>()
                + core::mem::size_of::<GetCapabilitiesV12>()
        }
    };

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != expected_len {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let base_req =
        GetCapabilitiesBase::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    // Reserved parameters must be zero.
    if base_req.param1 != 0 || base_req.param2 != 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let mut peer_capabilities = DeviceCapabilities::default();
    peer_capabilities.flags = CapabilityFlags::new(0);

    if version > SpdmVersion::V10 {
        let req_11 = GetCapabilitiesV11::decode(&mut reader)
            .map_err(|e| (false, CommandError::Codec(e)))?;

        let flags = req_11.flags;
        if !req_flag_compatible(version, &flags) {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
        }

        if req_11.ct_exponent > MAX_CT_EXPONENT {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
        }

        peer_capabilities.ct_exponent = req_11.ct_exponent;
        peer_capabilities.flags = flags;

        if version >= SpdmVersion::V12 {
            let req_12 = GetCapabilitiesV12::decode(&mut reader)
                .map_err(|e| (false, CommandError::Codec(e)))?;

            let data_transfer_size = req_12.data_transfer_size;
            let max_spdm_msg_size = req_12.max_spdm_msg_size;

            if data_transfer_size < MIN_DATA_TRANSFER_SIZE_V12
                || data_transfer_size > max_spdm_msg_size
            {
                Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
            }

            // Without chunking, a message must fit in one data transfer.
            if flags.chunk_cap() == 0 && data_transfer_size != max_spdm_msg_size {
                Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
            }

            peer_capabilities.data_transfer_size = data_transfer_size;
            peer_capabilities.max_spdm_msg_size = max_spdm_msg_size;
        }
    }

    ctx.state.connection_info.set_version_number(version);
    ctx.state
        .connection_info
        .set_peer_capabilities(peer_capabilities);
    Ok(())
}

fn generate_capabilities_response(
    rsp_buf: &mut MessageBuf,
    version: SpdmVersion,
    local_capabilities: &DeviceCapabilities,
) -> CommandResult<()> {
    let spdm_hdr = SpdmMsgHdr::new(version, ReqRespCode::Capabilities);
    spdm_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    GetCapabilitiesBase::default()
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    GetCapabilitiesV11::new(local_capabilities.ct_exponent, local_capabilities.flags)
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    if version >= SpdmVersion::V12 {
        let rsp_12 = GetCapabilitiesV12 {
            data_transfer_size: local_capabilities.data_transfer_size,
            max_spdm_msg_size: local_capabilities.max_spdm_msg_size,
        };
        rsp_12
            .encode(rsp_buf)
            .map_err(|_| (false, CommandError::BufferTooSmall))?;
    }
    Ok(())
}

pub(crate) fn handle_get_capabilities(
    ctx: &mut SpdmContext,
    spdm_hdr: SpdmMsgHdr,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    // The requester commits to one of the versions offered in VERSION.
    let version = match spdm_hdr.version() {
        Ok(v) if ctx.supported_versions.contains(&v) => v,
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::VersionMismatch, 0, None))?,
    };

    ctx.response_state_gate(ReqRespCode::GetCapabilities, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() != ConnectionState::AfterVersion {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    process_get_capabilities(ctx, version, req, rsp_buf)?;

    generate_capabilities_response(rsp_buf, version, &ctx.local_capabilities)?;

    ctx.transcript
        .append(TranscriptContext::A, req)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    ctx.transcript
        .append(TranscriptContext::A, rsp_buf.message())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    ctx.state
        .connection_info
        .set_state(ConnectionState::AfterCapabilities);
    Ok(())
}
