// Licensed under the Apache-2.0 license

use crate::codec::{write_u16, Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::config::MAX_SIGNATURE_SIZE;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{
    BaseHashAlgoType, MeasCapability, ReqRespCode, SpdmMsgHdr, SpdmVersion, NONCE_LEN,
    REQUESTER_CONTEXT_LEN,
};
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub(crate) const MEAS_SUMMARY_NONE: u8 = 0x00;
pub(crate) const MEAS_SUMMARY_TCB: u8 = 0x01;
pub(crate) const MEAS_SUMMARY_ALL: u8 = 0xFF;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct ChallengeReqBase {
    slot_id: u8,
    meas_summary_hash_type: u8,
    nonce: [u8; NONCE_LEN],
}

impl CommonCodec for ChallengeReqBase {}

/// Digest over every provisioned measurement value, or the TCB subset
/// (immutable-ROM blocks) when the requester asked for that.
pub(crate) fn encode_measurement_summary_hash(
    ctx: &mut SpdmContext,
    hash_type: BaseHashAlgoType,
    meas_summary_hash_type: u8,
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    ctx.crypto
        .hash_init(hash_type)
        .map_err(|e| (false, CommandError::Crypto(e)))?;
    for block in ctx.measurements.iter() {
        if meas_summary_hash_type == MEAS_SUMMARY_TCB
            && block.value_type != crate::measurements::DmtfMeasurementType::ImmutableRom
        {
            continue;
        }
        ctx.crypto
            .hash_update(block.value)
            .map_err(|e| (false, CommandError::Crypto(e)))?;
    }
    let mut summary = crate::protocol::SpdmDigest::default();
    ctx.crypto
        .hash_final(&mut summary)
        .map_err(|e| (false, CommandError::Crypto(e)))?;

    rsp_buf
        .put_data(summary.as_ref().len())
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(summary.as_ref());
    Ok(())
}

pub(crate) fn handle_challenge(
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

    ctx.response_state_gate(ReqRespCode::Challenge, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    // Challenge authenticates the connection, not a session.
    if session_id.is_some() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    if ctx.local_capabilities.flags.chal_cap() == 0 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    let expected_len = if connection_version >= SpdmVersion::V13 {
        core::mem::size_of::<ChallengeReqBase>() + REQUESTER_CONTEXT_LEN
    } else {
        core::mem::size_of::<ChallengeReqBase>()
    };
    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() != expected_len {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let challenge_req =
        ChallengeReqBase::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    let slot_id = challenge_req.slot_id;
    if ctx.cert_store.chain(slot_id).is_none() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let meas_summary_hash_type = challenge_req.meas_summary_hash_type;
    match meas_summary_hash_type {
        MEAS_SUMMARY_NONE => {}
        MEAS_SUMMARY_TCB | MEAS_SUMMARY_ALL => {
            if ctx.local_capabilities.flags.meas_cap() == MeasCapability::NoMeasurement as u8 {
                Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
            }
        }
        _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?,
    }

    let selected = match ctx.negotiated_algorithms() {
        Some(selected) => selected,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };
    let hash_type = selected.base_hash;
    let asym_algo = selected.base_asym;

    ctx.reset_transcripts_via_request_code(ReqRespCode::Challenge);

    // A fresh challenge restarts the C log.
    ctx.transcript.reset_context(TranscriptContext::C);
    ctx.transcript
        .append(TranscriptContext::C, req)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let (_, provisioned_slot_mask) = ctx.cert_store.slot_masks();

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::ChallengeAuth);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&[slot_id, provisioned_slot_mask]);

    // CertChainHash
    let cert_digest = ctx
        .cert_chain_digest(slot_id, hash_type)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    rsp_buf
        .put_data(cert_digest.as_ref().len())
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(cert_digest.as_ref());

    // Nonce
    let mut nonce = [0u8; NONCE_LEN];
    ctx.crypto
        .get_random(&mut nonce)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    rsp_buf
        .put_data(NONCE_LEN)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&nonce);

    if meas_summary_hash_type != MEAS_SUMMARY_NONE {
        encode_measurement_summary_hash(ctx, hash_type, meas_summary_hash_type, rsp_buf)?;
    }

    // OpaqueDataLength
    let opaque_len = rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    write_u16(opaque_len, 0);

    // Everything up to here binds into M1; the signature itself does not.
    ctx.transcript
        .append(TranscriptContext::C, rsp_buf.message())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let m1_digest = ctx
        .m1_hash(hash_type)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let mut signature = [0u8; MAX_SIGNATURE_SIZE];
    let sig_len = ctx
        .crypto
        .sign(slot_id, asym_algo, m1_digest.as_ref(), &mut signature)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    if sig_len != asym_algo.signature_size() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }
    rsp_buf
        .put_data(sig_len)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&signature[..sig_len]);

    ctx.state
        .connection_info
        .set_state(ConnectionState::Authenticated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::error_rsp::ErrorCode;
    use crate::context::SpdmContext;
    use crate::testutil::*;
    use sha2::{Digest, Sha384};

    fn challenge_request(slot: u8, summary: u8) -> Vec<u8> {
        let mut req = vec![0x12, 0x83, slot, summary];
        req.extend_from_slice(&[0x5C; NONCE_LEN]);
        req
    }

    #[test]
    fn test_challenge_auth_layout_and_state() {
        let chain = [0xC5u8; 150];
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &chain).unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx
            .handle_request(&challenge_request(0, MEAS_SUMMARY_NONE), &mut rsp)
            .unwrap();

        assert_eq!(rsp[1], 0x03);
        assert_eq!(rsp[2], 0); // slot
        assert_eq!(rsp[3], 0b1); // provisioned slot mask
        // header + params + chain hash + nonce + opaque len + signature
        assert_eq!(len, 2 + 2 + 48 + 32 + 2 + 96);
        assert_eq!(&rsp[4..52], Sha384::digest(chain).as_slice());
        assert_eq!(ctx.connection_state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_challenge_with_measurement_summary() {
        let chain = [0xC5u8; 150];
        let value = [0x9Au8; 24];
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &chain).unwrap();
        ctx.provision_measurement(crate::measurements::MeasurementBlock {
            index: 1,
            value_type: crate::measurements::DmtfMeasurementType::ImmutableRom,
            value: &value,
        })
        .unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx
            .handle_request(&challenge_request(0, MEAS_SUMMARY_ALL), &mut rsp)
            .unwrap();
        assert_eq!(rsp[1], 0x03);
        assert_eq!(len, 2 + 2 + 48 + 32 + 48 + 2 + 96);
        assert_eq!(&rsp[84..132], Sha384::digest(value).as_slice());
    }

    #[test]
    fn test_challenge_unprovisioned_slot() {
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
        ctx.handle_request(&challenge_request(0, MEAS_SUMMARY_NONE), &mut rsp)
            .unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
        assert_eq!(ctx.connection_state(), ConnectionState::AlgorithmsNegotiated);
    }
}
