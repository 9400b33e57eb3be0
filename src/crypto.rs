// Licensed under the Apache-2.0 license

//! Collaborator interface to the platform's cryptographic services. The core
//! never touches key material: signatures, DHE secrets and the session key
//! schedule live behind this trait, keyed by session id where session-scoped.

use crate::protocol::{BaseAsymAlgoType, BaseHashAlgoType, DheGroupType, SpdmDigest};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CryptoError {
    #[error("hash context not initialized")]
    InvalidState,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("signing failure")]
    SigningFailure,
    #[error("random generation failure")]
    RandomFailure,
    #[error("key schedule failure")]
    KeySchedule,
    #[error("unknown session")]
    UnknownSession,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Session keys the core asks HMACs from. The finished keys authenticate the
/// handshake transcript in each direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionKeyUsage {
    RequestFinishedKey,
    ResponseFinishedKey,
}

pub trait CryptoProvider {
    /// Begins an incremental hash with the given algorithm.
    fn hash_init(&mut self, hash_type: BaseHashAlgoType) -> CryptoResult<()>;

    /// Feeds a chunk into the running hash.
    fn hash_update(&mut self, data: &[u8]) -> CryptoResult<()>;

    /// Finishes the running hash and resets the engine.
    fn hash_final(&mut self, digest: &mut SpdmDigest) -> CryptoResult<()>;

    fn hash_all(
        &mut self,
        hash_type: BaseHashAlgoType,
        data: &[u8],
        digest: &mut SpdmDigest,
    ) -> CryptoResult<()> {
        self.hash_init(hash_type)?;
        self.hash_update(data)?;
        self.hash_final(digest)
    }

    fn get_random(&mut self, out: &mut [u8]) -> CryptoResult<()>;

    /// Signs `hash` with the private key behind certificate slot `slot_id`.
    /// Returns the signature length, which must match the algorithm's size.
    fn sign(
        &mut self,
        slot_id: u8,
        asym_algo: BaseAsymAlgoType,
        hash: &[u8],
        signature: &mut [u8],
    ) -> CryptoResult<usize>;

    /// Runs the DHE exchange for a new session: consumes the peer's exchange
    /// data, writes the responder's, and retains the shared secret under
    /// `session_id`. Returns the exchange data length.
    fn dhe_generate(
        &mut self,
        session_id: u32,
        dhe_group: DheGroupType,
        peer_exchange: &[u8],
        self_exchange: &mut [u8],
    ) -> CryptoResult<usize>;

    /// Binds the pre-shared key identified by `psk_hint` to `session_id`.
    fn psk_derive(&mut self, session_id: u32, psk_hint: &[u8]) -> CryptoResult<()>;

    /// Derives the handshake-phase secrets for `session_id` from the TH1
    /// transcript hash.
    fn derive_handshake_secrets(&mut self, session_id: u32, th1_hash: &[u8]) -> CryptoResult<()>;

    /// Derives the data-phase secrets for `session_id` from the TH2
    /// transcript hash.
    fn derive_data_secrets(&mut self, session_id: u32, th2_hash: &[u8]) -> CryptoResult<()>;

    /// HMACs `data` with the named session key.
    fn session_hmac(
        &mut self,
        session_id: u32,
        usage: SessionKeyUsage,
        data: &[u8],
        mac: &mut SpdmDigest,
    ) -> CryptoResult<()>;

    /// Rolls the session data keys forward; `all` also rolls the major
    /// secret.
    fn update_session_key(&mut self, session_id: u32, all: bool) -> CryptoResult<()>;

    /// Discards all key material held for `session_id`.
    fn release_session(&mut self, session_id: u32);
}
