// Licensed under the Apache-2.0 license

use crate::codec::CommonCodec;
use crate::config::MAX_HASH_SIZE;
use crate::error::{SpdmError, SpdmResult};
use crate::protocol::version::SpdmVersion;
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const NONCE_LEN: usize = 32;
pub const REQUESTER_CONTEXT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReqRespCode {
    GetDigests = 0x81,
    Digests = 0x01,
    GetCertificate = 0x82,
    Certificate = 0x02,
    Challenge = 0x83,
    ChallengeAuth = 0x03,
    GetVersion = 0x84,
    Version = 0x04,
    GetMeasurements = 0xE0,
    Measurements = 0x60,
    GetCapabilities = 0xE1,
    Capabilities = 0x61,
    NegotiateAlgorithms = 0xE3,
    Algorithms = 0x63,
    KeyExchange = 0xE4,
    KeyExchangeRsp = 0x64,
    Finish = 0xE5,
    FinishRsp = 0x65,
    PskExchange = 0xE6,
    PskExchangeRsp = 0x66,
    PskFinish = 0xE7,
    PskFinishRsp = 0x67,
    Heartbeat = 0xE8,
    HeartbeatAck = 0x68,
    KeyUpdate = 0xE9,
    KeyUpdateAck = 0x69,
    EndSession = 0xEC,
    EndSessionAck = 0x6C,
    VendorDefinedRequest = 0xFE,
    VendorDefinedResponse = 0x7E,
    Error = 0x7F,
}

impl TryFrom<u8> for ReqRespCode {
    type Error = SpdmError;
    fn try_from(value: u8) -> Result<Self, SpdmError> {
        match value {
            0x81 => Ok(ReqRespCode::GetDigests),
            0x01 => Ok(ReqRespCode::Digests),
            0x82 => Ok(ReqRespCode::GetCertificate),
            0x02 => Ok(ReqRespCode::Certificate),
            0x83 => Ok(ReqRespCode::Challenge),
            0x03 => Ok(ReqRespCode::ChallengeAuth),
            0x84 => Ok(ReqRespCode::GetVersion),
            0x04 => Ok(ReqRespCode::Version),
            0xE0 => Ok(ReqRespCode::GetMeasurements),
            0x60 => Ok(ReqRespCode::Measurements),
            0xE1 => Ok(ReqRespCode::GetCapabilities),
            0x61 => Ok(ReqRespCode::Capabilities),
            0xE3 => Ok(ReqRespCode::NegotiateAlgorithms),
            0x63 => Ok(ReqRespCode::Algorithms),
            0xE4 => Ok(ReqRespCode::KeyExchange),
            0x64 => Ok(ReqRespCode::KeyExchangeRsp),
            0xE5 => Ok(ReqRespCode::Finish),
            0x65 => Ok(ReqRespCode::FinishRsp),
            0xE6 => Ok(ReqRespCode::PskExchange),
            0x66 => Ok(ReqRespCode::PskExchangeRsp),
            0xE7 => Ok(ReqRespCode::PskFinish),
            0x67 => Ok(ReqRespCode::PskFinishRsp),
            0xE8 => Ok(ReqRespCode::Heartbeat),
            0x68 => Ok(ReqRespCode::HeartbeatAck),
            0xE9 => Ok(ReqRespCode::KeyUpdate),
            0x69 => Ok(ReqRespCode::KeyUpdateAck),
            0xEC => Ok(ReqRespCode::EndSession),
            0x6C => Ok(ReqRespCode::EndSessionAck),
            0xFE => Ok(ReqRespCode::VendorDefinedRequest),
            0x7E => Ok(ReqRespCode::VendorDefinedResponse),
            0x7F => Ok(ReqRespCode::Error),
            _ => Err(SpdmError::UnsupportedRequest),
        }
    }
}

impl From<ReqRespCode> for u8 {
    fn from(code: ReqRespCode) -> Self {
        code as u8
    }
}

impl ReqRespCode {
    /// Response opcode paired with this request opcode.
    pub(crate) fn response_code(&self) -> SpdmResult<ReqRespCode> {
        match self {
            ReqRespCode::GetDigests => Ok(ReqRespCode::Digests),
            ReqRespCode::GetCertificate => Ok(ReqRespCode::Certificate),
            ReqRespCode::Challenge => Ok(ReqRespCode::ChallengeAuth),
            ReqRespCode::GetVersion => Ok(ReqRespCode::Version),
            ReqRespCode::GetMeasurements => Ok(ReqRespCode::Measurements),
            ReqRespCode::GetCapabilities => Ok(ReqRespCode::Capabilities),
            ReqRespCode::NegotiateAlgorithms => Ok(ReqRespCode::Algorithms),
            ReqRespCode::KeyExchange => Ok(ReqRespCode::KeyExchangeRsp),
            ReqRespCode::Finish => Ok(ReqRespCode::FinishRsp),
            ReqRespCode::PskExchange => Ok(ReqRespCode::PskExchangeRsp),
            ReqRespCode::PskFinish => Ok(ReqRespCode::PskFinishRsp),
            ReqRespCode::Heartbeat => Ok(ReqRespCode::HeartbeatAck),
            ReqRespCode::KeyUpdate => Ok(ReqRespCode::KeyUpdateAck),
            ReqRespCode::EndSession => Ok(ReqRespCode::EndSessionAck),
            ReqRespCode::VendorDefinedRequest => Ok(ReqRespCode::VendorDefinedResponse),
            _ => Err(SpdmError::UnsupportedRequest),
        }
    }
}

/// First two bytes of every SPDM message. `param1`/`param2` belong to the
/// per-opcode payload structs.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable)]
#[repr(C)]
pub struct SpdmMsgHdr {
    version: u8,
    req_resp_code: u8,
}

impl SpdmMsgHdr {
    pub(crate) fn new(version: SpdmVersion, req_resp_code: ReqRespCode) -> Self {
        Self {
            version: version.into(),
            req_resp_code: req_resp_code.into(),
        }
    }

    pub(crate) fn version(&self) -> SpdmResult<SpdmVersion> {
        self.version.try_into()
    }

    pub(crate) fn req_resp_code(&self) -> SpdmResult<ReqRespCode> {
        self.req_resp_code.try_into()
    }

    pub(crate) fn raw_code(&self) -> u8 {
        self.req_resp_code
    }
}

impl CommonCodec for SpdmMsgHdr {}

/// Variable-length digest value, sized for the largest negotiable hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SpdmDigest {
    pub data: [u8; MAX_HASH_SIZE],
    pub length: u8,
}

impl Default for SpdmDigest {
    fn default() -> Self {
        Self {
            data: [0u8; MAX_HASH_SIZE],
            length: 0,
        }
    }
}

impl AsRef<[u8]> for SpdmDigest {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }
}

impl SpdmDigest {
    pub fn new(digest: &[u8]) -> Self {
        let mut data = [0u8; MAX_HASH_SIZE];
        let length = digest.len().min(MAX_HASH_SIZE);
        data[..length].copy_from_slice(&digest[..length]);
        Self {
            data,
            length: length as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_response_pairing() {
        assert_eq!(
            ReqRespCode::GetCertificate.response_code().unwrap(),
            ReqRespCode::Certificate
        );
        assert_eq!(
            ReqRespCode::KeyUpdate.response_code().unwrap(),
            ReqRespCode::KeyUpdateAck
        );
        assert!(ReqRespCode::Error.response_code().is_err());
    }

    #[test]
    fn test_opcode_round_trip() {
        for raw in 0..=u8::MAX {
            if let Ok(code) = ReqRespCode::try_from(raw) {
                assert_eq!(u8::from(code), raw);
            }
        }
    }
}
