//! CRC-32/MPEG-2 validation for splice_info_section, per §4.1/§6.2.
//!
//! A CRC failure is a warning, never a hard rejection — the signal is still
//! usable, the source stream is just slightly suspect.

use crc::{Crc, CRC_32_MPEG_2};

pub const MPEG_2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn calculate_crc(data: &[u8]) -> u32 {
    MPEG_2.checksum(data)
}

pub fn validate_crc(data: &[u8], expected_crc: u32) -> bool {
    calculate_crc(data) == expected_crc
}

/// Validates the trailing CRC-32 of a complete splice_info_section buffer.
/// Returns `Ok(false)` rather than erroring on mismatch; only a too-short
/// buffer is an error, since that indicates truncated input rather than a
/// CRC disagreement.
pub fn validate_message_crc(buffer: &[u8]) -> Result<bool, &'static str> {
    if buffer.len() < 4 {
        return Err("buffer too short to contain a CRC-32 field");
    }
    let split = buffer.len() - 4;
    let (data, crc_bytes) = buffer.split_at(split);
    let stored = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    Ok(validate_crc(data, stored))
}
