// Licensed under the Apache-2.0 license

use crate::error::{SpdmError, SpdmResult};
use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Bit-position identifiers for the negotiable base hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseHashAlgoType {
    TpmAlgSha256 = 0,
    TpmAlgSha384 = 1,
    TpmAlgSha512 = 2,
}

impl TryFrom<u8> for BaseHashAlgoType {
    type Error = SpdmError;
    fn try_from(value: u8) -> Result<Self, SpdmError> {
        match value {
            0 => Ok(BaseHashAlgoType::TpmAlgSha256),
            1 => Ok(BaseHashAlgoType::TpmAlgSha384),
            2 => Ok(BaseHashAlgoType::TpmAlgSha512),
            _ => Err(SpdmError::InvalidParam),
        }
    }
}

impl From<BaseHashAlgoType> for u32 {
    fn from(algo: BaseHashAlgoType) -> u32 {
        1 << (algo as u8)
    }
}

impl BaseHashAlgoType {
    pub fn digest_size(&self) -> usize {
        match self {
            BaseHashAlgoType::TpmAlgSha256 => 32,
            BaseHashAlgoType::TpmAlgSha384 => 48,
            BaseHashAlgoType::TpmAlgSha512 => 64,
        }
    }
}

/// Bit-position identifiers for the negotiable signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseAsymAlgoType {
    EcdsaP256 = 4,
    EcdsaP384 = 7,
}

impl TryFrom<u8> for BaseAsymAlgoType {
    type Error = SpdmError;
    fn try_from(value: u8) -> Result<Self, SpdmError> {
        match value {
            4 => Ok(BaseAsymAlgoType::EcdsaP256),
            7 => Ok(BaseAsymAlgoType::EcdsaP384),
            _ => Err(SpdmError::InvalidParam),
        }
    }
}

impl From<BaseAsymAlgoType> for u32 {
    fn from(algo: BaseAsymAlgoType) -> u32 {
        1 << (algo as u8)
    }
}

impl BaseAsymAlgoType {
    pub fn signature_size(&self) -> usize {
        match self {
            BaseAsymAlgoType::EcdsaP256 => 64,
            BaseAsymAlgoType::EcdsaP384 => 96,
        }
    }
}

/// Bit-position identifiers for the negotiable DHE groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DheGroupType {
    Secp256r1 = 3,
    Secp384r1 = 4,
}

impl TryFrom<u8> for DheGroupType {
    type Error = SpdmError;
    fn try_from(value: u8) -> Result<Self, SpdmError> {
        match value {
            3 => Ok(DheGroupType::Secp256r1),
            4 => Ok(DheGroupType::Secp384r1),
            _ => Err(SpdmError::InvalidParam),
        }
    }
}

impl From<DheGroupType> for u16 {
    fn from(group: DheGroupType) -> u16 {
        1 << (group as u8)
    }
}

impl DheGroupType {
    pub fn exchange_data_size(&self) -> usize {
        match self {
            DheGroupType::Secp256r1 => 64,
            DheGroupType::Secp384r1 => 96,
        }
    }
}

/// Bit-position identifiers for the negotiable AEAD suites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AeadSuiteType {
    Aes128Gcm = 0,
    Aes256Gcm = 1,
    Chacha20Poly1305 = 2,
}

impl TryFrom<u8> for AeadSuiteType {
    type Error = SpdmError;
    fn try_from(value: u8) -> Result<Self, SpdmError> {
        match value {
            0 => Ok(AeadSuiteType::Aes128Gcm),
            1 => Ok(AeadSuiteType::Aes256Gcm),
            2 => Ok(AeadSuiteType::Chacha20Poly1305),
            _ => Err(SpdmError::InvalidParam),
        }
    }
}

impl From<AeadSuiteType> for u16 {
    fn from(suite: AeadSuiteType) -> u16 {
        1 << (suite as u8)
    }
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct BaseHashAlgoMask(u32);
impl Debug;
u8;
pub tpm_alg_sha_256, set_tpm_alg_sha_256: 0, 0;
pub tpm_alg_sha_384, set_tpm_alg_sha_384: 1, 1;
pub tpm_alg_sha_512, set_tpm_alg_sha_512: 2, 2;
reserved, _: 31, 3;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct BaseAsymAlgoMask(u32);
impl Debug;
u8;
pub tpm_alg_rsassa_2048, set_tpm_alg_rsassa_2048: 0, 0;
pub tpm_alg_rsapss_2048, set_tpm_alg_rsapss_2048: 1, 1;
pub tpm_alg_rsassa_3072, set_tpm_alg_rsassa_3072: 2, 2;
pub tpm_alg_rsapss_3072, set_tpm_alg_rsapss_3072: 3, 3;
pub tpm_alg_ecdsa_ecc_nist_p256, set_tpm_alg_ecdsa_ecc_nist_p256: 4, 4;
pub tpm_alg_rsassa_4096, set_tpm_alg_rsassa_4096: 5, 5;
pub tpm_alg_rsapss_4096, set_tpm_alg_rsapss_4096: 6, 6;
pub tpm_alg_ecdsa_ecc_nist_p384, set_tpm_alg_ecdsa_ecc_nist_p384: 7, 7;
pub tpm_alg_ecdsa_ecc_nist_p521, set_tpm_alg_ecdsa_ecc_nist_p521: 8, 8;
reserved, _: 31, 9;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct DheGroupMask(u16);
impl Debug;
u8;
pub ffdhe2048, set_ffdhe2048: 0, 0;
pub ffdhe3072, set_ffdhe3072: 1, 1;
pub ffdhe4096, set_ffdhe4096: 2, 2;
pub secp256r1, set_secp256r1: 3, 3;
pub secp384r1, set_secp384r1: 4, 4;
pub secp521r1, set_secp521r1: 5, 5;
reserved, _: 15, 6;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct AeadSuiteMask(u16);
impl Debug;
u8;
pub aes_128_gcm, set_aes_128_gcm: 0, 0;
pub aes_256_gcm, set_aes_256_gcm: 1, 1;
pub chacha20_poly1305, set_chacha20_poly1305: 2, 2;
reserved, _: 15, 3;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct KeyScheduleMask(u16);
impl Debug;
u8;
pub spdm_key_schedule, set_spdm_key_schedule: 0, 0;
reserved, _: 15, 1;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct MeasurementSpecification(u8);
impl Debug;
u8;
pub dmtf_measurement_spec, set_dmtf_measurement_spec: 0, 0;
reserved, _: 7, 1;
}

bitfield! {
#[derive(FromBytes, IntoBytes, Immutable, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct OtherParamSupport(u8);
impl Debug;
u8;
pub opaque_data_fmt0, set_opaque_data_fmt0: 0, 0;
pub opaque_data_fmt1, set_opaque_data_fmt1: 1, 1;
reserved, _: 7, 2;
}

/// Picks one bit out of the intersection of the local and peer masks, walking
/// the priority table first and falling back to the lowest common bit.
pub(crate) trait Prioritize<T>
where
    Self: Sized,
    T: Copy + Into<Self>,
{
    fn prioritize(&self, peer: &Self, priority_table: Option<&[T]>) -> Self;
}

macro_rules! impl_prioritize {
    ($ty:ty) => {
        impl<T> Prioritize<T> for $ty
        where
            T: Copy + Into<$ty>,
        {
            fn prioritize(&self, peer: &Self, priority_table: Option<&[T]>) -> Self {
                let common = self & peer;
                if common == 0 {
                    return 0;
                }
                if let Some(priority_table) = priority_table {
                    for &priority in priority_table {
                        let priority_alg: $ty = priority.into();
                        if common & priority_alg != 0 {
                            return priority_alg;
                        }
                    }
                }
                1 << common.trailing_zeros()
            }
        }
    };
}

impl_prioritize!(u8);
impl_prioritize!(u16);
impl_prioritize!(u32);

/// Algorithm masks of one endpoint, local or peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceAlgorithms {
    pub measurement_spec: MeasurementSpecification,
    pub other_params: OtherParamSupport,
    pub base_hash_algo: BaseHashAlgoMask,
    pub base_asym_algo: BaseAsymAlgoMask,
    pub dhe_group: DheGroupMask,
    pub aead_suite: AeadSuiteMask,
    pub req_base_asym_algo: BaseAsymAlgoMask,
    pub key_schedule: KeyScheduleMask,
}

/// Local tie-break ordering applied during negotiation. `None` falls back to
/// lowest-common-bit selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlgorithmPriorityTable<'a> {
    pub base_hash_algo: Option<&'a [BaseHashAlgoType]>,
    pub base_asym_algo: Option<&'a [BaseAsymAlgoType]>,
    pub dhe_group: Option<&'a [DheGroupType]>,
    pub aead_suite: Option<&'a [AeadSuiteType]>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDeviceAlgorithms<'a> {
    pub device_algorithms: DeviceAlgorithms,
    pub algorithm_priority_table: AlgorithmPriorityTable<'a>,
}

/// Outcome of NEGOTIATE_ALGORITHMS, fixed for the rest of the connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedAlgorithms {
    pub measurement_spec: MeasurementSpecification,
    pub other_params: OtherParamSupport,
    pub base_hash: BaseHashAlgoType,
    pub base_asym: BaseAsymAlgoType,
    pub dhe_group: Option<DheGroupType>,
    pub aead_suite: Option<AeadSuiteType>,
    pub key_schedule: KeyScheduleMask,
}

pub(crate) fn validate_device_algorithms(
    local_algorithms: &LocalDeviceAlgorithms,
) -> SpdmResult<()> {
    let algorithms = &local_algorithms.device_algorithms;
    if algorithms.base_hash_algo.0 == 0
        || algorithms.base_asym_algo.0 == 0
        || algorithms.measurement_spec.dmtf_measurement_spec() == 0
    {
        Err(SpdmError::InvalidParam)?;
    }
    Ok(())
}

impl Default for SelectedAlgorithms {
    fn default() -> Self {
        Self {
            measurement_spec: MeasurementSpecification(1),
            other_params: OtherParamSupport(0),
            base_hash: BaseHashAlgoType::TpmAlgSha384,
            base_asym: BaseAsymAlgoType::EcdsaP384,
            dhe_group: None,
            aead_suite: None,
            key_schedule: KeyScheduleMask(0),
        }
    }
}
