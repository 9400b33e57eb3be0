// Licensed under the Apache-2.0 license

use crate::codec::CodecError;
use crate::commands::error_rsp::ErrorCode;
use crate::crypto::CryptoError;
use crate::measurements::MeasurementsError;
use crate::session::SessionError;
use crate::transcript::TranscriptError;
use crate::vdm::VdmError;
use thiserror::Error;

/// Core-plane failures: contract violations surfaced to the caller as a
/// non-success status. A protocol-level error is never one of these; it is
/// encoded as an ERROR response in the output buffer instead.
#[derive(Error, Debug, PartialEq)]
pub enum SpdmError {
    #[error("unsupported SPDM version")]
    UnsupportedVersion,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("unsupported request code")]
    UnsupportedRequest,
    #[error("codec error: {0}")]
    Codec(CodecError),
    #[error("command error: {0}")]
    Command(CommandError),
}

pub type SpdmResult<T> = Result<T, SpdmError>;

/// Handler-plane result. The `bool` records whether a well-formed protocol
/// error response has been materialized in the caller's output buffer: the
/// dispatcher reports those as successful dispatches and only lets the
/// `(false, _)` arm escape as a core error.
pub type CommandResult<T> = Result<T, (bool, CommandError)>;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("unsupported request")]
    UnsupportedRequest,
    #[error("codec error: {0}")]
    Codec(CodecError),
    #[error("protocol error response: {0:?}")]
    ErrorCode(ErrorCode),
    #[error("crypto provider error: {0}")]
    Crypto(CryptoError),
    #[error("transcript error: {0}")]
    Transcript(TranscriptError),
    #[error("session error: {0}")]
    Session(SessionError),
    #[error("measurements error: {0}")]
    Measurements(MeasurementsError),
    #[error("vendor handler error: {0}")]
    Vdm(VdmError),
}
