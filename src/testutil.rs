// Licensed under the Apache-2.0 license

//! Shared helpers for the in-crate tests: a deterministic crypto provider and
//! raw request builders that drive a context through the handshake.

use crate::codec::{read_u16, write_u16, write_u32};
use crate::context::SpdmContext;
use crate::crypto::{CryptoError, CryptoProvider, CryptoResult, SessionKeyUsage};
use crate::protocol::*;
use sha2::{Digest, Sha256, Sha384, Sha512};

pub(crate) const TEST_VERSIONS: &[SpdmVersion] = &[
    SpdmVersion::V10,
    SpdmVersion::V11,
    SpdmVersion::V12,
    SpdmVersion::V13,
];

pub(crate) const UNKNOWN_PSK_HINT: &[u8] = b"unknown-psk";

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

pub(crate) struct MockCryptoProvider {
    hasher: Option<Hasher>,
    random_counter: u8,
}

impl MockCryptoProvider {
    pub fn new() -> Self {
        Self {
            hasher: None,
            random_counter: 0,
        }
    }

    /// Deterministic stand-in for the session HMAC: SHA-384 over the usage
    /// tag and the data. Tests replicate it to forge valid verify data.
    pub fn expected_hmac(usage: SessionKeyUsage, data: &[u8]) -> [u8; 48] {
        let mut hasher = Sha384::new();
        hasher.update([usage_tag(usage)]);
        hasher.update(data);
        hasher.finalize().into()
    }
}

fn usage_tag(usage: SessionKeyUsage) -> u8 {
    match usage {
        SessionKeyUsage::RequestFinishedKey => 0x51,
        SessionKeyUsage::ResponseFinishedKey => 0x52,
    }
}

impl CryptoProvider for MockCryptoProvider {
    fn hash_init(&mut self, hash_type: BaseHashAlgoType) -> CryptoResult<()> {
        self.hasher = Some(match hash_type {
            BaseHashAlgoType::TpmAlgSha256 => Hasher::Sha256(Sha256::new()),
            BaseHashAlgoType::TpmAlgSha384 => Hasher::Sha384(Sha384::new()),
            BaseHashAlgoType::TpmAlgSha512 => Hasher::Sha512(Sha512::new()),
        });
        Ok(())
    }

    fn hash_update(&mut self, data: &[u8]) -> CryptoResult<()> {
        match self.hasher.as_mut() {
            Some(Hasher::Sha256(h)) => h.update(data),
            Some(Hasher::Sha384(h)) => h.update(data),
            Some(Hasher::Sha512(h)) => h.update(data),
            None => return Err(CryptoError::InvalidState),
        }
        Ok(())
    }

    fn hash_final(&mut self, digest: &mut SpdmDigest) -> CryptoResult<()> {
        match self.hasher.take() {
            Some(Hasher::Sha256(h)) => *digest = SpdmDigest::new(&h.finalize()),
            Some(Hasher::Sha384(h)) => *digest = SpdmDigest::new(&h.finalize()),
            Some(Hasher::Sha512(h)) => *digest = SpdmDigest::new(&h.finalize()),
            None => return Err(CryptoError::InvalidState),
        }
        Ok(())
    }

    fn get_random(&mut self, out: &mut [u8]) -> CryptoResult<()> {
        for byte in out.iter_mut() {
            *byte = self.random_counter;
            self.random_counter = self.random_counter.wrapping_add(1);
        }
        Ok(())
    }

    fn sign(
        &mut self,
        slot_id: u8,
        asym_algo: BaseAsymAlgoType,
        hash: &[u8],
        signature: &mut [u8],
    ) -> CryptoResult<usize> {
        let sig_len = asym_algo.signature_size();
        if signature.len() < sig_len {
            return Err(CryptoError::SigningFailure);
        }
        for (i, byte) in signature[..sig_len].iter_mut().enumerate() {
            *byte = hash[i % hash.len()] ^ slot_id;
        }
        Ok(sig_len)
    }

    fn dhe_generate(
        &mut self,
        _session_id: u32,
        dhe_group: DheGroupType,
        peer_exchange: &[u8],
        self_exchange: &mut [u8],
    ) -> CryptoResult<usize> {
        let len = dhe_group.exchange_data_size();
        if peer_exchange.len() != len || self_exchange.len() < len {
            return Err(CryptoError::KeySchedule);
        }
        for (i, byte) in self_exchange[..len].iter_mut().enumerate() {
            *byte = peer_exchange[i] ^ 0xD7;
        }
        Ok(len)
    }

    fn psk_derive(&mut self, _session_id: u32, psk_hint: &[u8]) -> CryptoResult<()> {
        if psk_hint == UNKNOWN_PSK_HINT {
            return Err(CryptoError::KeySchedule);
        }
        Ok(())
    }

    fn derive_handshake_secrets(&mut self, _session_id: u32, _th1_hash: &[u8]) -> CryptoResult<()> {
        Ok(())
    }

    fn derive_data_secrets(&mut self, _session_id: u32, _th2_hash: &[u8]) -> CryptoResult<()> {
        Ok(())
    }

    fn session_hmac(
        &mut self,
        _session_id: u32,
        usage: SessionKeyUsage,
        data: &[u8],
        mac: &mut SpdmDigest,
    ) -> CryptoResult<()> {
        *mac = SpdmDigest::new(&Self::expected_hmac(usage, data));
        Ok(())
    }

    fn update_session_key(&mut self, _session_id: u32, _all: bool) -> CryptoResult<()> {
        Ok(())
    }

    fn release_session(&mut self, _session_id: u32) {}
}

pub(crate) fn test_local_capabilities() -> DeviceCapabilities {
    let mut flags = CapabilityFlags::new(0);
    flags.set_cert_cap(1);
    flags.set_chal_cap(1);
    flags.set_meas_cap(MeasCapability::MeasurementsWithSignature as u8);
    flags.set_encrypt_cap(1);
    flags.set_mac_cap(1);
    flags.set_key_ex_cap(1);
    flags.set_psk_cap(PskCapability::PskWithContext as u8);
    flags.set_hbeat_cap(1);
    flags.set_key_upd_cap(1);
    DeviceCapabilities {
        ct_exponent: 12,
        flags,
        data_transfer_size: 4096,
        max_spdm_msg_size: 4096,
    }
}

pub(crate) fn test_local_algorithms() -> LocalDeviceAlgorithms<'static> {
    let mut measurement_spec = MeasurementSpecification(0);
    measurement_spec.set_dmtf_measurement_spec(1);
    LocalDeviceAlgorithms {
        device_algorithms: DeviceAlgorithms {
            measurement_spec,
            other_params: OtherParamSupport(0),
            base_hash_algo: BaseHashAlgoMask(0b111),
            base_asym_algo: BaseAsymAlgoMask(
                u32::from(BaseAsymAlgoType::EcdsaP384) | u32::from(BaseAsymAlgoType::EcdsaP256),
            ),
            dhe_group: DheGroupMask(
                u16::from(DheGroupType::Secp384r1) | u16::from(DheGroupType::Secp256r1),
            ),
            aead_suite: AeadSuiteMask(u16::from(AeadSuiteType::Aes256Gcm)),
            req_base_asym_algo: BaseAsymAlgoMask(0),
            key_schedule: KeyScheduleMask(1),
        },
        algorithm_priority_table: AlgorithmPriorityTable::default(),
    }
}

/// Requester flags that pass the capability cross-checks.
pub(crate) fn test_requester_flags() -> CapabilityFlags {
    let mut flags = CapabilityFlags::new(0);
    flags.set_cert_cap(1);
    flags.set_chal_cap(1);
    flags.set_encrypt_cap(1);
    flags.set_mac_cap(1);
    flags.set_key_ex_cap(1);
    flags.set_psk_cap(PskCapability::PskWithNoContext as u8);
    flags.set_hbeat_cap(1);
    flags.set_key_upd_cap(1);
    flags
}

pub(crate) fn get_version_request() -> Vec<u8> {
    vec![0x10, 0x84, 0x00, 0x00]
}

pub(crate) fn get_capabilities_request(version: u8, flags: CapabilityFlags) -> Vec<u8> {
    let mut req = vec![version, 0xE1, 0x00, 0x00];
    // reserved, ct_exponent, reserved
    req.extend_from_slice(&[0x00, 0x0C, 0x00, 0x00]);
    let mut flag_bytes = [0u8; 4];
    write_u32(&mut flag_bytes, flags.raw());
    req.extend_from_slice(&flag_bytes);
    if version >= 0x12 {
        let mut size_bytes = [0u8; 4];
        write_u32(&mut size_bytes, 4096);
        req.extend_from_slice(&size_bytes);
        req.extend_from_slice(&size_bytes);
    }
    req
}

pub(crate) fn negotiate_algorithms_request(version: u8) -> Vec<u8> {
    let mut req = vec![version, 0xE3, 0x04, 0x00];
    let mut scratch2 = [0u8; 2];
    let mut scratch4 = [0u8; 4];

    // Total message length, filled in below.
    req.extend_from_slice(&[0x00, 0x00]);
    // MeasurementSpecification, OtherParamSupport
    req.extend_from_slice(&[0x01, 0x00]);
    write_u32(&mut scratch4, u32::from(BaseAsymAlgoType::EcdsaP384));
    req.extend_from_slice(&scratch4);
    write_u32(&mut scratch4, u32::from(BaseHashAlgoType::TpmAlgSha384));
    req.extend_from_slice(&scratch4);
    req.extend_from_slice(&[0u8; 12]);
    // No external algorithm lists.
    req.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    for (alg_type, supported) in [
        (2u8, u16::from(DheGroupType::Secp384r1)),
        (3u8, u16::from(AeadSuiteType::Aes256Gcm)),
        (4u8, 0u16),
        (5u8, 1u16),
    ] {
        req.push(alg_type);
        req.push(0x20);
        write_u16(&mut scratch2, supported);
        req.extend_from_slice(&scratch2);
    }

    let total = req.len() as u16;
    write_u16(&mut scratch2, total);
    req[4..6].copy_from_slice(&scratch2);
    req
}

/// Drives a fresh context through VCA on SPDM 1.2 and returns the
/// concatenated request/response bytes, i.e. the message_a transcript.
pub(crate) fn negotiate_with_transcript(ctx: &mut SpdmContext) -> Vec<u8> {
    let mut rsp = [0u8; 2048];
    let mut vca = Vec::new();

    let req = get_version_request();
    let len = ctx.handle_request(&req, &mut rsp).unwrap();
    assert_eq!(rsp[1], 0x04, "unexpected {:02x?}", &rsp[..len]);
    vca.extend_from_slice(&req);
    vca.extend_from_slice(&rsp[..len]);

    let req = get_capabilities_request(0x12, test_requester_flags());
    let len = ctx.handle_request(&req, &mut rsp).unwrap();
    assert_eq!(rsp[1], 0x61, "unexpected {:02x?}", &rsp[..len]);
    vca.extend_from_slice(&req);
    vca.extend_from_slice(&rsp[..len]);

    let req = negotiate_algorithms_request(0x12);
    let len = ctx.handle_request(&req, &mut rsp).unwrap();
    assert_eq!(rsp[1], 0x63, "unexpected {:02x?}", &rsp[..len]);
    vca.extend_from_slice(&req);
    vca.extend_from_slice(&rsp[..len]);

    vca
}

/// Drives a fresh context through VCA on SPDM 1.2.
pub(crate) fn negotiate(ctx: &mut SpdmContext) {
    let _ = negotiate_with_transcript(ctx);
}

pub(crate) fn key_exchange_request() -> Vec<u8> {
    let mut req = vec![0x12, 0xE4, 0x00, 0x00];
    req.extend_from_slice(&0xBEEFu16.to_le_bytes());
    req.push(0x00); // session policy
    req.push(0x00); // reserved
    req.extend_from_slice(&[0xA5; 32]); // requester random
    req.extend_from_slice(&[0x33; 96]); // P-384 exchange data
    req.extend_from_slice(&0u16.to_le_bytes()); // opaque length
    req
}

/// Runs KEY_EXCHANGE + FINISH against `ctx`, forging the requester verify
/// data the same way the mock provider computes it. `vca` is the transcript
/// returned by [`negotiate_with_transcript`]; `chain` the slot-0 provision.
/// Returns the established session id.
pub(crate) fn establish_session(ctx: &mut SpdmContext, vca: &[u8], chain: &[u8]) -> u32 {
    let mut rsp = [0u8; 2048];

    let kx_req = key_exchange_request();
    let len = ctx.handle_request(&kx_req, &mut rsp).unwrap();
    assert_eq!(rsp[1], 0x64, "unexpected {:02x?}", &rsp[..len.min(8)]);

    let rsp_session_half = read_u16(&rsp[4..6]);
    let session_id = (u32::from(rsp_session_half) << 16) | 0xBEEF;

    // Session transcript K is the full exchange.
    let mut message_k = kx_req.clone();
    message_k.extend_from_slice(&rsp[..len]);

    let finish_base = [0x12u8, 0xE5, 0x00, 0x00];
    let mut th_input = Vec::new();
    th_input.extend_from_slice(vca);
    th_input.extend_from_slice(&Sha384::digest(chain));
    th_input.extend_from_slice(&message_k);
    th_input.extend_from_slice(&finish_base);
    let th: [u8; 48] = Sha384::digest(&th_input).into();
    let verify_data = MockCryptoProvider::expected_hmac(SessionKeyUsage::RequestFinishedKey, &th);

    let mut finish_req = finish_base.to_vec();
    finish_req.extend_from_slice(&verify_data);
    ctx.set_request_session_id(Some(session_id));
    let len = ctx.handle_request(&finish_req, &mut rsp).unwrap();
    assert_eq!(rsp[1], 0x65, "unexpected {:02x?}", &rsp[..len.min(8)]);

    session_id
}
