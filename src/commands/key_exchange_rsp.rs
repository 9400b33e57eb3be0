// Licensed under the Apache-2.0 license

use crate::codec::{write_u16, Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::challenge_auth_rsp::{encode_measurement_summary_hash, MEAS_SUMMARY_NONE};
use crate::commands::error_rsp::ErrorCode;
use crate::config::{MAX_DHE_EXCHANGE_DATA_SIZE, MAX_OPAQUE_DATA_SIZE, MAX_SIGNATURE_SIZE};
use crate::context::SpdmContext;
use crate::crypto::SessionKeyUsage;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{MeasCapability, ReqRespCode, SpdmMsgHdr};
use crate::session::{SessionPolicy, SessionState, SessionType};
use crate::state::ConnectionState;
use crate::transcript::SessionTranscriptContext;
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub(crate) const RANDOM_DATA_LEN: usize = 32;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct KeyExchangeReqBase {
    meas_summary_hash_type: u8,
    slot_id: u8,
    req_session_id: u16,
    // Reserved before 1.2.
    session_policy: u8,
    reserved: u8,
    random_data: [u8; RANDOM_DATA_LEN],
}

impl CommonCodec for KeyExchangeReqBase {}

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct KeyExchangeRspBase {
    heartbeat_period: u8,
    reserved: u8,
    rsp_session_id: u16,
    mut_auth_requested: u8,
    slot_id_param: u8,
    random_data: [u8; RANDOM_DATA_LEN],
}

impl CommonCodec for KeyExchangeRspBase {}

fn session_type_from_caps(ctx: &SpdmContext) -> SessionType {
    let local = ctx.local_capabilities.flags;
    let peer = ctx.state.connection_info.peer_capabilities().flags;

    let mac_cap = local.mac_cap() != 0 && peer.mac_cap() != 0;
    let encrypt_cap = local.encrypt_cap() != 0 && peer.encrypt_cap() != 0;
    match (mac_cap, encrypt_cap) {
        (true, true) => SessionType::MacAndEncrypt,
        (true, false) => SessionType::MacOnly,
        _ => SessionType::None,
    }
}

pub(crate) fn handshake_in_the_clear(ctx: &SpdmContext) -> bool {
    ctx.local_capabilities.flags.handshake_in_the_clear_cap() != 0
        && ctx
            .state
            .connection_info
            .peer_capabilities()
            .flags
            .handshake_in_the_clear_cap()
            != 0
}

#[allow(clippy::too_many_arguments)]
fn generate_key_exchange_response(
    ctx: &mut SpdmContext,
    session_id: u32,
    rsp_session_id: u16,
    slot_id: u8,
    meas_summary_hash_type: u8,
    peer_exchange: &[u8],
    req: &[u8],
    rsp_buf: &mut MessageBuf,
) -> CommandResult<()> {
    let selected = match ctx.negotiated_algorithms() {
        Some(selected) => selected,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?,
    };
    let hash_type = selected.base_hash;
    let asym_algo = selected.base_asym;
    let dhe_group = match selected.dhe_group {
        Some(group) => group,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
    };

    ctx.append_session_transcript(session_id, SessionTranscriptContext::K, req)?;

    let mut self_exchange = [0u8; MAX_DHE_EXCHANGE_DATA_SIZE];
    let exchange_len = ctx
        .crypto
        .dhe_generate(session_id, dhe_group, peer_exchange, &mut self_exchange)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    if exchange_len != dhe_group.exchange_data_size() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }

    let mut random_data = [0u8; RANDOM_DATA_LEN];
    ctx.crypto
        .get_random(&mut random_data)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    let connection_version = ctx.state.connection_info.version_number();
    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::KeyExchangeRsp);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let rsp_base = KeyExchangeRspBase {
        heartbeat_period: 0,
        reserved: 0,
        rsp_session_id,
        mut_auth_requested: 0,
        slot_id_param: 0,
        random_data,
    };
    rsp_base
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    rsp_buf
        .put_data(exchange_len)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&self_exchange[..exchange_len]);

    if meas_summary_hash_type != MEAS_SUMMARY_NONE {
        encode_measurement_summary_hash(ctx, hash_type, meas_summary_hash_type, rsp_buf)?;
    }

    let opaque_len = rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    write_u16(opaque_len, 0);

    // Signature binds everything sent so far.
    ctx.append_session_transcript(session_id, SessionTranscriptContext::K, rsp_buf.message())?;
    let th1_digest = ctx.th_hash(session_id, hash_type, false)?;

    let mut signature = [0u8; MAX_SIGNATURE_SIZE];
    let sig_len = ctx
        .crypto
        .sign(slot_id, asym_algo, th1_digest.as_ref(), &mut signature)
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    if sig_len != asym_algo.signature_size() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
    }
    rsp_buf
        .put_data(sig_len)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&signature[..sig_len]);
    ctx.append_session_transcript(
        session_id,
        SessionTranscriptContext::K,
        &signature[..sig_len],
    )?;

    // Handshake secrets come from the transcript including the signature.
    let th1_sig_digest = ctx.th_hash(session_id, hash_type, false)?;
    ctx.crypto
        .derive_handshake_secrets(session_id, th1_sig_digest.as_ref())
        .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;

    if !handshake_in_the_clear(ctx) {
        let mut verify_data = crate::protocol::SpdmDigest::default();
        ctx.crypto
            .session_hmac(
                session_id,
                SessionKeyUsage::ResponseFinishedKey,
                th1_sig_digest.as_ref(),
                &mut verify_data,
            )
            .map_err(|_| ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?;
        rsp_buf
            .put_data(verify_data.as_ref().len())
            .map_err(|_| (false, CommandError::BufferTooSmall))?
            .copy_from_slice(verify_data.as_ref());
        ctx.append_session_transcript(
            session_id,
            SessionTranscriptContext::K,
            verify_data.as_ref(),
        )?;
    }
    Ok(())
}

pub(crate) fn handle_key_exchange(
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

    ctx.response_state_gate(ReqRespCode::KeyExchange, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    // A key exchange cannot itself arrive on a secure session.
    if session_id.is_some() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    let local_flags = ctx.local_capabilities.flags;
    let peer_flags = ctx.state.connection_info.peer_capabilities().flags;
    if local_flags.key_ex_cap() == 0 || peer_flags.key_ex_cap() == 0 {
        Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?;
    }

    let dhe_group = match ctx.negotiated_algorithms().and_then(|s| s.dhe_group) {
        Some(group) => group,
        None => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
    };
    let exchange_data_size = dhe_group.exchange_data_size();

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() < core::mem::size_of::<KeyExchangeReqBase>() + exchange_data_size + 2 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let req_base =
        KeyExchangeReqBase::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;
    let peer_exchange = reader
        .take(exchange_data_size)
        .map_err(|e| (false, CommandError::Codec(e)))?;
    let opaque_len = reader.read_u16().map_err(|e| (false, CommandError::Codec(e)))?;
    if opaque_len as usize > MAX_OPAQUE_DATA_SIZE
        || reader.remaining() != opaque_len as usize
    {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let slot_id = req_base.slot_id;
    if ctx.cert_store.chain(slot_id).is_none() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let meas_summary_hash_type = req_base.meas_summary_hash_type;
    if meas_summary_hash_type != MEAS_SUMMARY_NONE
        && local_flags.meas_cap() == MeasCapability::NoMeasurement as u8
    {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }

    let (new_session_id, rsp_session_id) =
        ctx.session_mgr.generate_session_id(req_base.req_session_id);
    if ctx.session_mgr.create_session(new_session_id).is_err() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::SessionLimitExceeded, 0, None))?;
    }

    let session_type = session_type_from_caps(ctx);
    if let Ok(session_info) = ctx.session_mgr.session_info_mut(new_session_id) {
        session_info.init(
            SessionPolicy(req_base.session_policy),
            session_type,
            slot_id,
        );
    }

    ctx.reset_transcripts_via_request_code(ReqRespCode::KeyExchange);

    let result = generate_key_exchange_response(
        ctx,
        new_session_id,
        rsp_session_id,
        slot_id,
        meas_summary_hash_type,
        peer_exchange,
        req,
        rsp_buf,
    );
    if let Err(e) = result {
        // A failed handshake leaves no session behind.
        ctx.crypto.release_session(new_session_id);
        let _ = ctx.session_mgr.delete_session(new_session_id);
        return Err(e);
    }

    if let Ok(session_info) = ctx.session_mgr.session_info_mut(new_session_id) {
        session_info.set_session_state(SessionState::Handshaking);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_u16;
    use crate::commands::error_rsp::ErrorCode;
    use crate::testutil::*;
    use crate::transcript::TranscriptContext;

    const CHAIN: [u8; 200] = [0xC5; 200];

    #[test]
    fn test_key_exchange_creates_handshaking_session() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = crate::context::SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &CHAIN).unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx.handle_request(&key_exchange_request(), &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x64);
        // header + base + exchange + opaque len + signature + verify data
        assert_eq!(len, 2 + 38 + 96 + 2 + 96 + 48);

        let session_id = (u32::from(read_u16(&rsp[4..6])) << 16) | 0xBEEF;
        let session_info = ctx.session_mgr.session_info(session_id).unwrap();
        assert_eq!(session_info.session_state, SessionState::Handshaking);
        assert_eq!(session_info.session_type, SessionType::MacAndEncrypt);
    }

    #[test]
    fn test_key_exchange_rejects_sessioned_arrival() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = crate::context::SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &CHAIN).unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        ctx.set_request_session_id(Some(0x1234));
        ctx.handle_request(&key_exchange_request(), &mut rsp)
            .unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnexpectedRequest));
    }

    #[test]
    fn test_finish_with_bad_verify_data_is_decrypt_error() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = crate::context::SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &CHAIN).unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        let len = ctx.handle_request(&key_exchange_request(), &mut rsp).unwrap();
        let session_id = (u32::from(read_u16(&rsp[4..6])) << 16) | 0xBEEF;
        let _ = len;

        let mut finish_req = vec![0x12, 0xE5, 0x00, 0x00];
        finish_req.extend_from_slice(&[0u8; 48]);
        ctx.set_request_session_id(Some(session_id));
        ctx.handle_request(&finish_req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::DecryptError));

        let session_info = ctx.session_mgr.session_info(session_id).unwrap();
        assert_eq!(session_info.session_state, SessionState::Handshaking);
    }

    #[test]
    fn test_full_session_lifecycle() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = crate::context::SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &CHAIN).unwrap();
        let vca = negotiate_with_transcript(&mut ctx);

        let session_id = establish_session(&mut ctx, &vca, &CHAIN);
        assert_eq!(
            ctx.session_mgr
                .session_info(session_id)
                .unwrap()
                .session_state,
            SessionState::Established
        );

        let mut rsp = [0u8; 2048];

        // A sessioned certificate fetch answers normally but leaves message_b
        // alone.
        let b_before = ctx.transcript.size(TranscriptContext::B);
        let mut cert_req = vec![0x12, 0x82, 0x00, 0x00];
        cert_req.extend_from_slice(&0u16.to_le_bytes());
        cert_req.extend_from_slice(&0xFFFFu16.to_le_bytes());
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&cert_req, &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x02);
        assert_eq!(read_u16(&rsp[4..6]), 200);
        assert_eq!(len, 8 + 200);
        assert_eq!(ctx.transcript.size(TranscriptContext::B), b_before);

        // Heartbeat
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&[0x12, 0xE8, 0, 0], &mut rsp).unwrap();
        assert_eq!(rsp[1], 0x68);
        assert_eq!(len, 4);

        // Key update, single key
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&[0x12, 0xE9, 1, 7], &mut rsp).unwrap();
        assert_eq!(&rsp[..len], &[0x12, 0x69, 1, 7]);

        // End session tears the table entry down.
        ctx.set_request_session_id(Some(session_id));
        let len = ctx.handle_request(&[0x12, 0xEC, 0, 0], &mut rsp).unwrap();
        assert_eq!(&rsp[..len], &[0x12, 0x6C, 0, 0]);
        assert!(ctx.session_mgr.session_info(session_id).is_err());
    }

    #[test]
    fn test_session_ops_require_session() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = crate::context::SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.provision_cert_chain(0, &CHAIN).unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 2048];
        for req in [[0x12u8, 0xE8, 0, 0], [0x12, 0xE9, 1, 0], [0x12, 0xEC, 0, 0]] {
            ctx.handle_request(&req, &mut rsp).unwrap();
            assert_eq!(rsp[2], u8::from(ErrorCode::SessionRequired));
        }
    }
}
