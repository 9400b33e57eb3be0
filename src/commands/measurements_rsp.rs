// Licensed under the Apache-2.0 license

use crate::codec::{write_u16, write_u24, Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::config::MAX_SIGNATURE_SIZE;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{MeasCapability, ReqRespCode, SpdmMsgHdr, SpdmVersion, NONCE_LEN};
use crate::session::SessionState;
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Measurement operations selected by param2.
const MEAS_OP_TOTAL_COUNT: u8 = 0x00;
const MEAS_OP_ALL: u8 = 0xFF;

bitfield! {
    #[derive(FromBytes, IntoBytes, Immutable)]
    #[repr(C)]
    struct GetMeasurementsReqAttr(u8);
    impl Debug;
    u8;
    pub signature_requested, _: 0, 0;
    pub raw_bitstream_requested, _: 1, 1;
    pub new_measurement_requested, _: 2, 2;
    reserved, _: 7, 3;
}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
struct GetMeasurementsReqCommon {
    req_attr: GetMeasurementsReqAttr,
    meas_op: u8,
}

impl CommonCodec for GetMeasurementsReqCommon {}

pub(crate) fn handle_get_measurements(
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

    ctx.response_state_gate(ReqRespCode::GetMeasurements, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    if let Some(session_id) = session_id {
        match ctx.session_mgr.session_info(session_id) {
            Ok(info) if info.session_state == SessionState::Established => {}
            _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
        }
    }

    let meas_cap = ctx.local_capabilities.flags.meas_cap();
    if meas_cap == MeasCapability::NoMeasurement as u8 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() < core::mem::size_of::<GetMeasurementsReqCommon>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let req_common = GetMeasurementsReqCommon::decode(&mut reader)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    let signature_requested = req_common.req_attr.signature_requested() != 0;
    let raw_bitstream = req_common.req_attr.raw_bitstream_requested() != 0
        && connection_version >= SpdmVersion::V13;
    let meas_op = req_common.meas_op;

    if signature_requested && meas_cap != MeasCapability::MeasurementsWithSignature as u8 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    // Nonce and slot follow only on signed requests; the slot byte exists
    // from 1.1 on.
    let mut slot_id = 0u8;
    if signature_requested {
        let expected = if connection_version >= SpdmVersion::V11 {
            NONCE_LEN + 1
        } else {
            NONCE_LEN
        };
        if reader.remaining() != expected {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
        }
        let _requester_nonce = reader
            .take(NONCE_LEN)
            .map_err(|e| (false, CommandError::Codec(e)))?;
        if connection_version >= SpdmVersion::V11 {
            slot_id = reader.read_u8().map_err(|e| (false, CommandError::Codec(e)))?;
            if ctx.cert_store.chain(slot_id).is_none() {
                Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
            }
        }
    } else if !reader.is_empty() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let selected = match ctx.negotiated_algorithms() {
        Some(selected) => selected,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };
    let hash_type = selected.base_hash;
    let asym_algo = selected.base_asym;

    let total_count = ctx.measurements.total_count();
    if meas_op != MEAS_OP_TOTAL_COUNT
        && meas_op != MEAS_OP_ALL
        && ctx.measurements.block(meas_op).is_none()
    {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    // Every other opcode clears M; GET_MEASUREMENTS keeps accumulating it.
    ctx.reset_transcripts_via_request_code(ReqRespCode::GetMeasurements);

    ctx.transcript
        .append(TranscriptContext::M, req)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::Measurements);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let param1 = if meas_op == MEAS_OP_TOTAL_COUNT {
        total_count
    } else {
        0
    };
    let param2 = if signature_requested && connection_version >= SpdmVersion::V11 {
        slot_id
    } else {
        0
    };
    rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&[param1, param2]);

    // NumberOfBlocks, then MeasurementRecordLength as 24-bit.
    let number_of_blocks: u8 = match meas_op {
        MEAS_OP_TOTAL_COUNT => 0,
        MEAS_OP_ALL => total_count,
        _ => 1,
    };
    rsp_buf
        .put_data(1)
        .map_err(|_| (false, CommandError::BufferTooSmall))?[0] = number_of_blocks;

    let record_len_offset = rsp_buf.msg_len();
    rsp_buf
        .put_data(3)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&[0; 3]);

    let record_start = rsp_buf.msg_len();
    if meas_op == MEAS_OP_ALL {
        for block in ctx.measurements.iter() {
            ctx.measurements
                .encode_block(block, raw_bitstream, hash_type, ctx.crypto, rsp_buf)
                .map_err(|e| (false, CommandError::Measurements(e)))?;
        }
    } else if meas_op != MEAS_OP_TOTAL_COUNT {
        let block = match ctx.measurements.block(meas_op) {
            Some(block) => *block,
            None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?,
        };
        ctx.measurements
            .encode_block(&block, raw_bitstream, hash_type, ctx.crypto, rsp_buf)
            .map_err(|e| (false, CommandError::Measurements(e)))?;
    }
    let record_len = rsp_buf.msg_len() - record_start;
    let mut record_len_bytes = [0u8; 3];
    write_u24(&mut record_len_bytes, record_len as u32);
    rsp_buf
        .patch(record_len_offset, &record_len_bytes)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    // Nonce
    let mut nonce = [0u8; NONCE_LEN];
    ctx.crypto
        .get_random(&mut nonce)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    rsp_buf
        .put_data(NONCE_LEN)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&nonce);

    // OpaqueDataLength
    let opaque_len = rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    write_u16(opaque_len, 0);

    if signature_requested {
        ctx.transcript
            .append(TranscriptContext::M, rsp_buf.message())
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

        let l1_digest = ctx
            .l1_hash(hash_type)
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

        let mut signature = [0u8; MAX_SIGNATURE_SIZE];
        let sig_len = ctx
            .crypto
            .sign(slot_id, asym_algo, l1_digest.as_ref(), &mut signature)
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        if sig_len != asym_algo.signature_size() {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        }
        rsp_buf
            .put_data(sig_len)
            .map_err(|_| (false, CommandError::BufferTooSmall))?
            .copy_from_slice(&signature[..sig_len]);

        // The signed sub-phase is complete.
        ctx.transcript.reset_context(TranscriptContext::M);
    } else {
        ctx.transcript
            .append(TranscriptContext::M, rsp_buf.message())
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_u24;
    use crate::commands::error_rsp::ErrorCode;
    use crate::context::SpdmContext;
    use crate::measurements::{DmtfMeasurementType, MeasurementBlock};
    use crate::testutil::*;

    const FW_VALUE: [u8; 32] = [0xF1; 32];
    const CFG_VALUE: [u8; 16] = [0xC0; 16];

    fn provision(ctx: &mut SpdmContext) {
        ctx.provision_measurement(MeasurementBlock {
            index: 1,
            value_type: DmtfMeasurementType::ImmutableRom,
            value: &FW_VALUE,
        })
        .unwrap();
        ctx.provision_measurement(MeasurementBlock {
            index: 2,
            value_type: DmtfMeasurementType::FirmwareConfig,
            value: &CFG_VALUE,
        })
        .unwrap();
    }

    #[test]
    fn test_total_count_query() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        provision(&mut ctx);
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx.handle_request(&[0x12, 0xE0, 0x00, 0x00], &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x60);
        assert_eq!(rsp[2], 2); // total measurement count
        assert_eq!(rsp[4], 0); // no blocks in this response
        assert_eq!(read_u24(&rsp[5..8]), 0);
        // header + params + count + record len + nonce + opaque len
        assert_eq!(len, 2 + 2 + 1 + 3 + 32 + 2);
    }

    #[test]
    fn test_all_blocks_unsigned() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        provision(&mut ctx);
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx.handle_request(&[0x12, 0xE0, 0x00, 0xFF], &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x60);
        assert_eq!(rsp[4], 2);
        // Each digested block: 4-byte block header, 3-byte DMTF header, 48-byte digest.
        let record_len = read_u24(&rsp[5..8]) as usize;
        assert_eq!(record_len, 2 * (4 + 3 + 48));
        assert_eq!(len, 2 + 2 + 1 + 3 + record_len + 32 + 2);
        // First block header: index, DMTF spec, size.
        assert_eq!(rsp[8], 1);
        assert_eq!(rsp[9], 0x01);
    }

    #[test]
    fn test_signed_single_block_resets_transcript() {
        let chain = [0xC5u8; 128];
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &chain).unwrap();
        provision(&mut ctx);
        negotiate(&mut ctx);

        let mut req = vec![0x12, 0xE0, 0x01, 0x01];
        req.extend_from_slice(&[0xAB; 32]); // requester nonce
        req.push(0x00); // slot 0
        let mut rsp = [0u8; 2048];
        let len = ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x60);
        assert_eq!(rsp[4], 1);
        let record_len = read_u24(&rsp[5..8]) as usize;
        assert_eq!(record_len, 4 + 3 + 48);
        // Signature trails the opaque length field.
        assert_eq!(len, 2 + 2 + 1 + 3 + record_len + 32 + 2 + 96);
        assert_eq!(ctx.transcript.size(TranscriptContext::M), 0);
    }

    #[test]
    fn test_unknown_index_is_invalid() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        provision(&mut ctx);
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        ctx.handle_request(&[0x12, 0xE0, 0x00, 0x05], &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
    }
}
