// Licensed under the Apache-2.0 license

//! Provisioned measurement blocks served by GET_MEASUREMENTS. Values are
//! caller-owned blobs installed by the policy layer; the core encodes them in
//! DMTF measurement-block format, raw or digested.

use crate::codec::{write_u16, CodecError, MessageBuf};
use crate::config::{MAX_MEASUREMENT_BLOCKS, MAX_MEASUREMENT_VALUE_SIZE};
use crate::crypto::CryptoProvider;
use crate::error::{SpdmError, SpdmResult};
use crate::protocol::{BaseHashAlgoType, SpdmDigest};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MeasurementsError {
    #[error("invalid measurement index")]
    InvalidIndex,
    #[error("measurement buffer too small")]
    BufferTooSmall,
    #[error("measurement digest failure")]
    HashFailure,
    #[error("codec error: {0}")]
    Codec(CodecError),
}

pub type MeasurementsResult<T> = Result<T, MeasurementsError>;

/// DMTF measurement value types (DMTFSpecMeasurementValueType low bits).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DmtfMeasurementType {
    ImmutableRom = 0,
    MutableFirmware = 1,
    HardwareConfig = 2,
    FirmwareConfig = 3,
    FreeformManifest = 4,
}

const DMTF_MEASUREMENT_SPEC: u8 = 0x01;
const DMTF_VALUE_TYPE_RAW_BITSTREAM: u8 = 0x80;

const MEASUREMENT_BLOCK_HEADER_SIZE: usize = 4;
const DMTF_MEASUREMENT_HEADER_SIZE: usize = 3;

#[derive(Clone, Copy)]
pub struct MeasurementBlock<'a> {
    pub index: u8,
    pub value_type: DmtfMeasurementType,
    pub value: &'a [u8],
}

#[derive(Default)]
pub(crate) struct LocalMeasurements<'a> {
    blocks: [Option<MeasurementBlock<'a>>; MAX_MEASUREMENT_BLOCKS],
}

impl<'a> LocalMeasurements<'a> {
    pub fn new() -> Self {
        Self {
            blocks: [None; MAX_MEASUREMENT_BLOCKS],
        }
    }

    pub fn provision(&mut self, block: MeasurementBlock<'a>) -> SpdmResult<()> {
        // Index 0 is reserved; 0xFF addresses all blocks.
        if block.index == 0
            || block.index as usize > MAX_MEASUREMENT_BLOCKS
            || block.value.is_empty()
            || block.value.len() > MAX_MEASUREMENT_VALUE_SIZE
        {
            Err(SpdmError::InvalidParam)?;
        }
        self.blocks[block.index as usize - 1] = Some(block);
        Ok(())
    }

    pub fn total_count(&self) -> u8 {
        self.blocks.iter().filter(|b| b.is_some()).count() as u8
    }

    pub fn block(&self, index: u8) -> Option<&MeasurementBlock<'a>> {
        if index == 0 || index as usize > MAX_MEASUREMENT_BLOCKS {
            return None;
        }
        self.blocks[index as usize - 1].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementBlock<'a>> {
        self.blocks.iter().filter_map(|b| b.as_ref())
    }

    /// Encodes one block into `rsp_buf`: block header, DMTF measurement
    /// header, then the raw value or its digest. Returns the encoded length.
    pub fn encode_block(
        &self,
        block: &MeasurementBlock<'a>,
        raw_bitstream: bool,
        hash_type: BaseHashAlgoType,
        crypto: &mut dyn CryptoProvider,
        rsp_buf: &mut MessageBuf,
    ) -> MeasurementsResult<usize> {
        let mut digest = SpdmDigest::default();
        let (value_type, value): (u8, &[u8]) = if raw_bitstream {
            (
                block.value_type as u8 | DMTF_VALUE_TYPE_RAW_BITSTREAM,
                block.value,
            )
        } else {
            crypto
                .hash_all(hash_type, block.value, &mut digest)
                .map_err(|_| MeasurementsError::HashFailure)?;
            (block.value_type as u8, &digest.data[..digest.length as usize])
        };

        let dmtf_size = DMTF_MEASUREMENT_HEADER_SIZE + value.len();
        let total = MEASUREMENT_BLOCK_HEADER_SIZE + dmtf_size;

        let out = rsp_buf
            .put_data(total)
            .map_err(|_| MeasurementsError::BufferTooSmall)?;
        out[0] = block.index;
        out[1] = DMTF_MEASUREMENT_SPEC;
        write_u16(&mut out[2..4], dmtf_size as u16);
        out[4] = value_type;
        write_u16(&mut out[5..7], value.len() as u16);
        out[7..].copy_from_slice(value);

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_and_count() {
        let value = [0xAB; 16];
        let mut measurements = LocalMeasurements::new();
        measurements
            .provision(MeasurementBlock {
                index: 1,
                value_type: DmtfMeasurementType::ImmutableRom,
                value: &value,
            })
            .unwrap();
        measurements
            .provision(MeasurementBlock {
                index: 3,
                value_type: DmtfMeasurementType::FirmwareConfig,
                value: &value,
            })
            .unwrap();

        assert_eq!(measurements.total_count(), 2);
        assert!(measurements.block(1).is_some());
        assert!(measurements.block(2).is_none());
        assert!(measurements.block(0).is_none());
    }

    #[test]
    fn test_provision_rejects_reserved_index() {
        let value = [0u8; 4];
        let mut measurements = LocalMeasurements::new();
        assert!(measurements
            .provision(MeasurementBlock {
                index: 0,
                value_type: DmtfMeasurementType::ImmutableRom,
                value: &value,
            })
            .is_err());
    }
}
