// Licensed under the Apache-2.0 license

//! Build-time limits for the responder core. All working storage is sized
//! from these constants; nothing in the crate allocates.

/// Transcript buffer size classes. Every managed buffer is one of these.
pub const MAX_MESSAGE_SMALL_BUFFER_SIZE: usize = 0x100;
pub const MAX_MESSAGE_MEDIUM_BUFFER_SIZE: usize = 0x300;
pub const MAX_MESSAGE_LARGE_BUFFER_SIZE: usize = 0x1200;

/// Certificate chain slots addressable by GET_CERTIFICATE / GET_DIGESTS.
pub const MAX_CERT_CHAIN_SLOTS: usize = 8;

/// Largest CERTIFICATE portion returned when the peers have not negotiated
/// large-message chunking.
pub const MAX_CERT_CHAIN_BLOCK_LEN: usize = 1024;

/// Concurrent secure sessions.
pub const MAX_NUM_SESSIONS: usize = 4;

/// Measurement indices the responder can serve.
pub const MAX_MEASUREMENT_BLOCKS: usize = 8;
/// Largest single measurement value, raw or digest form.
pub const MAX_MEASUREMENT_VALUE_SIZE: usize = 128;

pub const MAX_HASH_SIZE: usize = 64;
pub const MAX_SIGNATURE_SIZE: usize = 96;
pub const MAX_DHE_EXCHANGE_DATA_SIZE: usize = 96;

pub const MAX_OPAQUE_DATA_SIZE: usize = 256;
pub const MAX_PSK_HINT_SIZE: usize = 32;
pub const MAX_PSK_CONTEXT_SIZE: usize = 64;

pub const MAX_VENDOR_ID_LEN: usize = 16;
pub const MAX_VENDOR_PAYLOAD_SIZE: usize = 256;
