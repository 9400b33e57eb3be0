// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::algorithms::*;
use crate::protocol::{ReqRespCode, SpdmMsgHdr, SpdmVersion};
use crate::state::ConnectionState;
use crate::transcript::TranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

// Algorithm structure table type tags.
const ALG_TYPE_DHE: u8 = 2;
const ALG_TYPE_AEAD: u8 = 3;
const ALG_TYPE_REQ_BASE_ASYM: u8 = 4;
const ALG_TYPE_KEY_SCHEDULE: u8 = 5;

// AlgCount: high nibble is the fixed field width (2 bytes), low nibble the
// external algorithm count, which this responder does not accept.
const ALG_COUNT_FIXED: u8 = 0x20;

const NUM_ALG_STRUCT_TABLES: u8 = 4;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct NegotiateAlgorithmsReqBase {
    param1: u8,
    param2: u8,
    length: u16,
    measurement_specification: MeasurementSpecification,
    other_param_support: OtherParamSupport,
    base_asym_algo: BaseAsymAlgoMask,
    base_hash_algo: BaseHashAlgoMask,
    reserved: [u8; 12],
    ext_asym_count: u8,
    ext_hash_count: u8,
    reserved2: [u8; 2],
}

impl CommonCodec for NegotiateAlgorithmsReqBase {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct AlgStruct {
    alg_type: u8,
    alg_count: u8,
    alg_supported: u16,
}

impl CommonCodec for AlgStruct {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct AlgorithmsRespBase {
    param1: u8,
    param2: u8,
    length: u16,
    measurement_specification_sel: MeasurementSpecification,
    other_param_sel: OtherParamSupport,
    measurement_hash_algo: u32,
    base_asym_sel: BaseAsymAlgoMask,
    base_hash_sel: BaseHashAlgoMask,
    reserved: [u8; 12],
    ext_asym_sel_count: u8,
    ext_hash_sel_count: u8,
    reserved2: [u8; 2],
}

impl CommonCodec for AlgorithmsRespBase {}

struct PeerAlgTables {
    dhe: DheGroupMask,
    aead: AeadSuiteMask,
    req_base_asym: BaseAsymAlgoMask,
    key_schedule: KeyScheduleMask,
}

fn parse_alg_struct_tables(
    ctx: &SpdmContext,
    count: u8,
    reader: &mut MessageReader,
    rsp_buf: &mut MessageBuf,
) -> CommandResult<PeerAlgTables> {
    let mut tables = PeerAlgTables {
        dhe: DheGroupMask(0),
        aead: AeadSuiteMask(0),
        req_base_asym: BaseAsymAlgoMask(0),
        key_schedule: KeyScheduleMask(0),
    };

    let mut last_type = 0u8;
    for _ in 0..count {
        let alg_struct =
            AlgStruct::decode(reader).map_err(|e| (false, CommandError::Codec(e)))?;

        // Tables arrive in ascending type order, each at most once.
        if alg_struct.alg_type <= last_type && last_type != 0 {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
        }
        if alg_struct.alg_count != ALG_COUNT_FIXED {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
        }
        last_type = alg_struct.alg_type;

        let supported = alg_struct.alg_supported;
        match alg_struct.alg_type {
            ALG_TYPE_DHE => tables.dhe = DheGroupMask(supported),
            ALG_TYPE_AEAD => tables.aead = AeadSuiteMask(supported),
            ALG_TYPE_REQ_BASE_ASYM => tables.req_base_asym = BaseAsymAlgoMask(supported as u32),
            ALG_TYPE_KEY_SCHEDULE => tables.key_schedule = KeyScheduleMask(supported),
            _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?,
        }
    }
    Ok(tables)
}

fn select_algorithms(
    ctx: &SpdmContext,
    peer: &DeviceAlgorithms,
    rsp_buf: &mut MessageBuf,
) -> CommandResult<SelectedAlgorithms> {
    let local = &ctx.local_algorithms.device_algorithms;
    let priority = &ctx.local_algorithms.algorithm_priority_table;

    // The DMTF measurement spec is the only defined bit.
    let meas_spec_sel =
        MeasurementSpecification(local.measurement_spec.0 & peer.measurement_spec.0 & 1);

    let hash_sel = local
        .base_hash_algo
        .0
        .prioritize(&peer.base_hash_algo.0, priority.base_hash_algo);
    let asym_sel = local
        .base_asym_algo
        .0
        .prioritize(&peer.base_asym_algo.0, priority.base_asym_algo);

    // A usable connection needs at least one common hash, signature and
    // measurement specification.
    if hash_sel.count_ones() != 1 || asym_sel.count_ones() != 1 || meas_spec_sel.0 == 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let base_hash = BaseHashAlgoType::try_from(hash_sel.trailing_zeros() as u8)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    let base_asym = BaseAsymAlgoType::try_from(asym_sel.trailing_zeros() as u8)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;

    let dhe_sel = local
        .dhe_group
        .0
        .prioritize(&peer.dhe_group.0, priority.dhe_group);
    let dhe_group = if dhe_sel == 0 {
        None
    } else {
        Some(
            DheGroupType::try_from(dhe_sel.trailing_zeros() as u8).map_err(|_| {
                ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None)
            })?,
        )
    };

    let aead_sel = local
        .aead_suite
        .0
        .prioritize(&peer.aead_suite.0, priority.aead_suite);
    let aead_suite = if aead_sel == 0 {
        None
    } else {
        Some(
            AeadSuiteType::try_from(aead_sel.trailing_zeros() as u8).map_err(|_| {
                ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None)
            })?,
        )
    };

    let key_schedule = KeyScheduleMask(local.key_schedule.0 & peer.key_schedule.0 & 1);

    let mut other_params = OtherParamSupport(0);
    other_params.set_opaque_data_fmt1(
        local.other_params.opaque_data_fmt1() & peer.other_params.opaque_data_fmt1(),
    );

    Ok(SelectedAlgorithms {
        measurement_spec: meas_spec_sel,
        other_params,
        base_hash,
        base_asym,
        dhe_group,
        aead_suite,
        key_schedule,
    })
}

fn generate_algorithms_response(
    version: SpdmVersion,
    selected: &SelectedAlgorithms,
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    let spdm_hdr = SpdmMsgHdr::new(version, ReqRespCode::Algorithms);
    spdm_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let num_tables = if version >= SpdmVersion::V11 {
        NUM_ALG_STRUCT_TABLES
    } else {
        0
    };

    let base_len = core::mem::size_of::<SpdmMsgHdr>()
        + core::mem::size_of::<AlgorithmsRespBase>()
        + num_tables as usize * core::mem::size_of::<AlgStruct>();

    let resp = AlgorithmsRespBase {
        param1: num_tables,
        param2: 0,
        length: base_len as u16,
        measurement_specification_sel: selected.measurement_spec,
        other_param_sel: selected.other_params,
        measurement_hash_algo: u32::from(selected.base_hash),
        base_asym_sel: BaseAsymAlgoMask(u32::from(selected.base_asym)),
        base_hash_sel: BaseHashAlgoMask(u32::from(selected.base_hash)),
        reserved: [0; 12],
        ext_asym_sel_count: 0,
        ext_hash_sel_count: 0,
        reserved2: [0; 2],
    };
    resp.encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    if version >= SpdmVersion::V11 {
        let tables = [
            AlgStruct {
                alg_type: ALG_TYPE_DHE,
                alg_count: ALG_COUNT_FIXED,
                alg_supported: selected.dhe_group.map(u16::from).unwrap_or(0),
            },
            AlgStruct {
                alg_type: ALG_TYPE_AEAD,
                alg_count: ALG_COUNT_FIXED,
                alg_supported: selected.aead_suite.map(u16::from).unwrap_or(0),
            },
            AlgStruct {
                alg_type: ALG_TYPE_REQ_BASE_ASYM,
                alg_count: ALG_COUNT_FIXED,
                alg_supported: 0,
            },
            AlgStruct {
                alg_type: ALG_TYPE_KEY_SCHEDULE,
                alg_count: ALG_COUNT_FIXED,
                alg_supported: selected.key_schedule.0,
            },
        ];
        for table in tables.iter() {
            table
                .encode(rsp_buf)
                .map_err(|_| (false, CommandError::BufferTooSmall))?;
        }
    }
    Ok(())
}

pub(crate) fn handle_negotiate_algorithms(
    ctx: &mut SpdmContext,
    spdm_hdr: SpdmMsgHdr,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    let connection_version = ctx.state.connection_info.version_number();
    if spdm_hdr.version().ok() != Some(connection_version) {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::VersionMismatch, 0, None))?;
    }

    ctx.response_state_gate(ReqRespCode::NegotiateAlgorithms, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() != ConnectionState::AfterCapabilities {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() < core::mem::size_of::<NegotiateAlgorithmsReqBase>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let base = NegotiateAlgorithmsReqBase::decode(&mut reader)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    let length = base.length;
    if length as usize != req.len() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    // External algorithm lists are not accepted.
    if base.ext_asym_count != 0 || base.ext_hash_count != 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let num_tables = base.param1;
    if connection_version == SpdmVersion::V10 && num_tables != 0 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    if reader.remaining() != num_tables as usize * core::mem::size_of::<AlgStruct>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let tables = parse_alg_struct_tables(ctx, num_tables, &mut reader, rsp_buf)?;

    let peer_algorithms = DeviceAlgorithms {
        measurement_spec: base.measurement_specification,
        other_params: base.other_param_support,
        base_hash_algo: base.base_hash_algo,
        base_asym_algo: base.base_asym_algo,
        dhe_group: tables.dhe,
        aead_suite: tables.aead,
        req_base_asym_algo: tables.req_base_asym,
        key_schedule: tables.key_schedule,
    };

    let selected = select_algorithms(ctx, &peer_algorithms, rsp_buf)?;

    generate_algorithms_response(connection_version, &selected, rsp_buf)?;

    ctx.state
        .connection_info
        .set_peer_algorithms(peer_algorithms);
    ctx.state.connection_info.set_selected_algorithms(selected);

    ctx.transcript
        .append(TranscriptContext::A, req)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    ctx.transcript
        .append(TranscriptContext::A, rsp_buf.message())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    ctx.state
        .connection_info
        .set_state(ConnectionState::AlgorithmsNegotiated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_u32;
    use crate::commands::error_rsp::ErrorCode;
    use crate::context::SpdmContext;
    use crate::testutil::*;

    fn fresh_after_capabilities<'a>(crypto: &'a mut MockCryptoProvider) -> SpdmContext<'a> {
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            crypto,
        )
        .unwrap();
        let mut rsp = [0u8; 64];
        ctx.handle_request(&get_version_request(), &mut rsp).unwrap();
        let req = get_capabilities_request(0x12, test_requester_flags());
        ctx.handle_request(&req, &mut rsp).unwrap();
        ctx
    }

    #[test]
    fn test_selection_lands_on_common_algorithms() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = fresh_after_capabilities(&mut crypto);

        let req = negotiate_algorithms_request(0x12);
        let mut rsp = [0u8; 128];
        let len = ctx.handle_request(&req, &mut rsp).unwrap();

        assert_eq!(rsp[1], 0x63);
        assert_eq!(len, 2 + 34 + 4 * 4);
        // base_hash_sel sits after meas spec/other params/meas hash/asym sel.
        let hash_sel = read_u32(&rsp[16..20]);
        assert_eq!(hash_sel, u32::from(BaseHashAlgoType::TpmAlgSha384));
        let asym_sel = read_u32(&rsp[12..16]);
        assert_eq!(asym_sel, u32::from(BaseAsymAlgoType::EcdsaP384));

        let selected = ctx.negotiated_algorithms().unwrap();
        assert_eq!(selected.base_hash, BaseHashAlgoType::TpmAlgSha384);
        assert_eq!(selected.base_asym, BaseAsymAlgoType::EcdsaP384);
        assert_eq!(selected.dhe_group, Some(DheGroupType::Secp384r1));
        assert_eq!(selected.aead_suite, Some(AeadSuiteType::Aes256Gcm));
    }

    #[test]
    fn test_length_field_must_cover_message() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = fresh_after_capabilities(&mut crypto);

        let mut req = negotiate_algorithms_request(0x12);
        req[4] = req[4].wrapping_add(1);
        let mut rsp = [0u8; 128];
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
    }

    #[test]
    fn test_no_common_hash_is_invalid() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = fresh_after_capabilities(&mut crypto);

        let mut req = negotiate_algorithms_request(0x12);
        // Peer hash mask: pick a bit outside the local mask.
        req[12] = 0x08;
        req[13] = 0x00;
        let mut rsp = [0u8; 128];
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
    }

    #[test]
    fn test_external_algorithm_lists_rejected() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = fresh_after_capabilities(&mut crypto);

        let mut req = negotiate_algorithms_request(0x12);
        // ext_asym_count lives after the fixed masks and 12 reserved bytes.
        req[28] = 1;
        let mut rsp = [0u8; 128];
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::InvalidRequest));
    }
}
