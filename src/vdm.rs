// Licensed under the Apache-2.0 license

//! Vendor-defined message delegation. The core validates the envelope and
//! routes the payload to a registered handler; the vendor protocol itself is
//! the handler's business.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VdmError {
    #[error("vendor protocol not supported")]
    UnsupportedProtocol,
    #[error("vendor response too large")]
    ResponseTooLarge,
    #[error("vendor handler failure")]
    HandlerFailure,
}

pub type VdmResult<T> = Result<T, VdmError>;

pub trait VdmResponder {
    /// Registry or standards body id this handler answers for.
    fn standard_id(&self) -> u16;

    /// Vendor id as registered with the standards body; may be empty.
    fn vendor_id(&self) -> &[u8];

    /// Handles one vendor request payload, writing the response payload into
    /// `rsp_payload` and returning its length.
    fn handle_request(&mut self, req_payload: &[u8], rsp_payload: &mut [u8]) -> VdmResult<usize>;
}
