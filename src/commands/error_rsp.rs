// Licensed under the Apache-2.0 license

use crate::codec::{Codec, CommonCodec, MessageBuf};
use crate::error::CommandError;
use crate::protocol::{ReqRespCode, SpdmMsgHdr, SpdmVersion};
use zerocopy::{FromBytes, Immutable, IntoBytes};

const MAX_EXTENDED_ERROR_DATA_SIZE: usize = 32;

// SPDM error codes
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ErrorCode {
    InvalidRequest = 0x01,
    Busy = 0x03,
    UnexpectedRequest = 0x04,
    Unspecified = 0x05,
    DecryptError = 0x06,
    UnsupportedRequest = 0x07,
    RequestInFlight = 0x08,
    InvalidResponseCode = 0x09,
    SessionLimitExceeded = 0x0A,
    SessionRequired = 0x0B,
    ResetRequired = 0x0C,
    ResponseTooLarge = 0x0D,
    RequestTooLarge = 0x0E,
    LargeResponse = 0x0F,
    MessageLost = 0x10,
    InvalidPolicy = 0x11,
    VersionMismatch = 0x41,
    ResponseNotReady = 0x42,
    RequestResynch = 0x43,
    OperationFailed = 0x44,
    NoPendingRequests = 0x45,
    VendorDefined = 0xFF,
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

pub type ErrorData = u8;

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
pub struct ErrorResponse {
    error_code: u8,
    error_data: ErrorData,
}

impl ErrorResponse {
    pub fn new(error_code: ErrorCode, error_data: ErrorData) -> Self {
        Self {
            error_code: error_code.into(),
            error_data,
        }
    }
}

impl CommonCodec for ErrorResponse {}

/// Extended payload carried by a ResponseNotReady error.
#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C)]
pub struct ResponseNotReadyExt {
    pub rdt_exponent: u8,
    pub request_code: u8,
    pub token: u8,
    pub rdtm: u8,
}

impl CommonCodec for ResponseNotReadyExt {}

/// Fabricates a complete SPDM ERROR response in `rsp_buf`. Returns the
/// handler-plane pair used as a tail call: the `true` arm tells the
/// dispatcher the buffer holds a transmittable response.
pub fn encode_error_response(
    rsp_buf: &mut MessageBuf,
    spdm_version: SpdmVersion,
    error_code: ErrorCode,
    error_data: u8,
    extended_data: Option<&[u8]>,
) -> (bool, CommandError) {
    let spdm_hdr = SpdmMsgHdr::new(spdm_version, ReqRespCode::Error);
    if let Err(e) = spdm_hdr.encode(rsp_buf) {
        return (false, CommandError::Codec(e));
    }

    let fixed_payload = ErrorResponse::new(error_code, error_data);
    if let Err(e) = fixed_payload.encode(rsp_buf) {
        return (false, CommandError::Codec(e));
    }

    if let Some(data) = extended_data {
        if data.len() > MAX_EXTENDED_ERROR_DATA_SIZE {
            return (false, CommandError::BufferTooSmall);
        }
        match rsp_buf.put_data(data.len()) {
            Ok(out) => out.copy_from_slice(data),
            Err(e) => return (false, CommandError::Codec(e)),
        }
    }

    (true, CommandError::ErrorCode(error_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_error_response() {
        let mut raw_buf = [0u8; 64];
        let mut buf = MessageBuf::new(&mut raw_buf);
        let error_code = ErrorCode::InvalidRequest;
        let error_data = 0x01;

        assert!(
            encode_error_response(&mut buf, SpdmVersion::V10, error_code, error_data, None)
                == (true, CommandError::ErrorCode(error_code))
        );
        assert_eq!(buf.msg_len(), 4);
        assert!(raw_buf[0] == SpdmVersion::V10.into());
        assert!(raw_buf[1] == ReqRespCode::Error.into());
        assert!(raw_buf[2] == error_code.into());
        assert!(raw_buf[3] == error_data);
    }

    #[test]
    fn test_fill_error_response_with_extended_data() {
        let mut raw_buf = [0u8; 64];
        let mut buf = MessageBuf::new(&mut raw_buf);
        let error_code = ErrorCode::ResponseNotReady;
        let ext = ResponseNotReadyExt {
            rdt_exponent: 10,
            request_code: 0x82,
            token: 3,
            rdtm: 1,
        };

        let ext_bytes = [ext.rdt_exponent, ext.request_code, ext.token, ext.rdtm];
        assert!(
            encode_error_response(&mut buf, SpdmVersion::V12, error_code, 0, Some(&ext_bytes))
                == (true, CommandError::ErrorCode(error_code))
        );
        assert_eq!(buf.msg_len(), 8);
        assert_eq!(raw_buf[2], error_code.into());
        assert_eq!(&raw_buf[4..8], &ext_bytes);
    }

    #[test]
    fn test_fill_error_response_with_too_large_extended_data() {
        let mut raw_buf = [0u8; 64];
        let mut buf = MessageBuf::new(&mut raw_buf);
        let extended_raw_data = [0x02; 33];

        assert!(
            encode_error_response(
                &mut buf,
                SpdmVersion::V10,
                ErrorCode::InvalidRequest,
                0x01,
                Some(&extended_raw_data)
            ) == (false, CommandError::BufferTooSmall)
        );
    }
}
