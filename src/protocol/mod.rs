// Licensed under the Apache-2.0 license

pub mod algorithms;
pub mod capabilities;
pub(crate) mod common;
pub mod version;

pub use algorithms::*;
pub use capabilities::*;
pub use common::{SpdmDigest, NONCE_LEN, REQUESTER_CONTEXT_LEN};
pub(crate) use common::{ReqRespCode, SpdmMsgHdr};
pub use version::*;
