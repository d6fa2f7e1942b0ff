//! Decodes a base64(url) splice_info_section payload into [`SpliceInfoSection`].
//!
//! Layout and field widths follow SCTE 35. All multi-byte fields are
//! big-endian; every PTS-bearing field is adjusted by `pts_adjustment` and
//! wrapped modulo 2^33 before being handed back to the caller, per §4.1.

use data_encoding::{BASE64, BASE64URL_NOPAD};

use super::byte_reader::ByteReader;
use super::crc;
use super::types::*;

const PTS_MODULO: u64 = 1 << 33;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "splice_info_section decode error: {}", self.0)
    }
}
impl std::error::Error for DecodeError {}

fn err(msg: impl Into<String>) -> DecodeError {
    DecodeError(msg.into())
}

fn adjust_pts(raw: u64, pts_adjustment: u64) -> u64 {
    (raw + pts_adjustment) % PTS_MODULO
}

/// Decodes a base64 or base64url payload (padded or not) into raw bytes.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = payload.trim();
    if let Ok(bytes) = BASE64.decode(trimmed.as_bytes()) {
        return Ok(bytes);
    }
    // Re-pad for the URL-safe, no-pad variant before falling back.
    let mut padded = trimmed.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    BASE64URL_NOPAD
        .decode(trimmed.as_bytes())
        .or_else(|_| BASE64.decode(padded.as_bytes()))
        .map_err(|e| err(format!("invalid base64 payload: {e}")))
}

pub fn parse_splice_info_section(bytes: &[u8]) -> Result<SpliceInfoSection, DecodeError> {
    let mut r = ByteReader::new(bytes);

    let table_id = r.read_u8().map_err(|e| err(e.to_string()))?;
    if table_id != 0xFC {
        return Err(err(format!("unexpected table_id 0x{table_id:02X}, want 0xFC")));
    }

    let section_syntax_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    let private_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    let sap_type = r.read_bits(2).map_err(|e| err(e.to_string()))? as u8;
    let section_length = r.read_bits(12).map_err(|e| err(e.to_string()))? as u16;

    let protocol_version = r.read_u8().map_err(|e| err(e.to_string()))?;
    let encrypted_packet = r.read_flag().map_err(|e| err(e.to_string()))?;
    let encryption_algorithm = r.read_bits(6).map_err(|e| err(e.to_string()))? as u8;
    let pts_adjustment = r.read_bits(33).map_err(|e| err(e.to_string()))?;
    let cw_index = r.read_u8().map_err(|e| err(e.to_string()))?;
    let tier = r.read_bits(12).map_err(|e| err(e.to_string()))? as u16;
    let splice_command_length = r.read_bits(12).map_err(|e| err(e.to_string()))? as u16;
    let splice_command_type = r.read_u8().map_err(|e| err(e.to_string()))?;

    let splice_command = parse_splice_command(&mut r, splice_command_type, pts_adjustment)?;

    let descriptor_loop_length = r.read_u16_be().map_err(|e| err(e.to_string()))?;
    let descriptor_loop_end = r.byte_offset() + descriptor_loop_length as usize;
    let mut splice_descriptors = Vec::new();
    while r.byte_offset() < descriptor_loop_end {
        splice_descriptors.push(parse_splice_descriptor(&mut r, pts_adjustment)?);
    }

    // Any alignment_stuffing / E_CRC_32 before the trailing CRC is skipped:
    // we only need the final CRC, and we validate it over the whole section
    // up to (not including) the CRC field itself.
    let remaining = r.remaining_bytes();
    if remaining < 4 {
        return Err(err("truncated section: no room for trailing CRC_32"));
    }
    let skip = remaining - 4;
    if skip > 0 {
        r.skip_bits((skip * 8) as u32).map_err(|e| err(e.to_string()))?;
    }
    let crc_32 = r.read_u32_be().map_err(|e| err(e.to_string()))?;

    let crc_valid = crc::validate_crc(&bytes[..bytes.len() - 4], crc_32);

    Ok(SpliceInfoSection {
        table_id,
        section_syntax_indicator,
        private_indicator,
        sap_type,
        section_length,
        protocol_version,
        encrypted_packet,
        encryption_algorithm,
        pts_adjustment,
        cw_index,
        tier,
        splice_command_length,
        splice_command_type,
        splice_command,
        splice_descriptors,
        crc_32,
        crc_valid,
    })
}

fn parse_splice_time(r: &mut ByteReader, pts_adjustment: u64) -> Result<SpliceTime, DecodeError> {
    let time_specified = r.read_flag().map_err(|e| err(e.to_string()))?;
    if time_specified {
        r.skip_bits(6).map_err(|e| err(e.to_string()))?; // reserved
        let raw = r.read_bits(33).map_err(|e| err(e.to_string()))?;
        Ok(SpliceTime { time_specified, pts_time: Some(adjust_pts(raw, pts_adjustment)) })
    } else {
        r.skip_bits(7).map_err(|e| err(e.to_string()))?; // reserved
        Ok(SpliceTime { time_specified, pts_time: None })
    }
}

fn parse_break_duration(r: &mut ByteReader) -> Result<BreakDuration, DecodeError> {
    let auto_return = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(6).map_err(|e| err(e.to_string()))?; // reserved
    let duration_90k = r.read_u40_be().map_err(|e| err(e.to_string()))?;
    Ok(BreakDuration { auto_return, duration_90k })
}

fn parse_splice_command(
    r: &mut ByteReader,
    command_type: u8,
    pts_adjustment: u64,
) -> Result<SpliceCommand, DecodeError> {
    match command_type {
        0x00 => Ok(SpliceCommand::SpliceNull),
        0x04 => parse_splice_schedule(r).map(SpliceCommand::SpliceSchedule),
        0x05 => parse_splice_insert(r, pts_adjustment).map(SpliceCommand::SpliceInsert),
        0x06 => {
            let splice_time = parse_splice_time(r, pts_adjustment)?;
            Ok(SpliceCommand::TimeSignal(TimeSignal { splice_time }))
        }
        0x07 => Ok(SpliceCommand::BandwidthReservation),
        0xFF => {
            let identifier = r.read_u32_be().map_err(|e| err(e.to_string()))?;
            let data = r.read_bytes(0).map_err(|e| err(e.to_string()))?.to_vec();
            Ok(SpliceCommand::PrivateCommand { identifier, data })
        }
        other => Ok(SpliceCommand::Unknown { command_type: other }),
    }
}

fn parse_splice_schedule(r: &mut ByteReader) -> Result<SpliceSchedule, DecodeError> {
    let splice_event_id = r.read_u32_be().map_err(|e| err(e.to_string()))?;
    let splice_event_cancel_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(7).map_err(|e| err(e.to_string()))?; // reserved

    if splice_event_cancel_indicator {
        return Ok(SpliceSchedule {
            splice_event_id,
            splice_event_cancel_indicator,
            out_of_network_indicator: false,
            scheduled_splice_time: None,
            splice_duration_90k: None,
            unique_program_id: 0,
            avail_num: 0,
            avails_expected: 0,
        });
    }

    let out_of_network_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    let program_splice_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    let duration_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(5).map_err(|e| err(e.to_string()))?; // reserved

    let scheduled_splice_time = if program_splice_flag {
        Some(r.read_u32_be().map_err(|e| err(e.to_string()))? as u64)
    } else {
        let component_count = r.read_u8().map_err(|e| err(e.to_string()))?;
        let mut last = None;
        for _ in 0..component_count {
            r.skip_bits(8).map_err(|e| err(e.to_string()))?; // component_tag
            last = Some(r.read_u32_be().map_err(|e| err(e.to_string()))? as u64);
        }
        last
    };

    let splice_duration_90k = if duration_flag {
        r.read_flag().map_err(|e| err(e.to_string()))?; // auto_return
        r.skip_bits(6).map_err(|e| err(e.to_string()))?; // reserved
        Some(r.read_u32_be().map_err(|e| err(e.to_string()))?)
    } else {
        None
    };

    let unique_program_id = r.read_u16_be().map_err(|e| err(e.to_string()))?;
    let avail_num = r.read_u8().map_err(|e| err(e.to_string()))?;
    let avails_expected = r.read_u8().map_err(|e| err(e.to_string()))?;

    Ok(SpliceSchedule {
        splice_event_id,
        splice_event_cancel_indicator,
        out_of_network_indicator,
        scheduled_splice_time,
        splice_duration_90k,
        unique_program_id,
        avail_num,
        avails_expected,
    })
}

fn parse_splice_insert(r: &mut ByteReader, pts_adjustment: u64) -> Result<SpliceInsert, DecodeError> {
    let splice_event_id = r.read_u32_be().map_err(|e| err(e.to_string()))?;
    let splice_event_cancel_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(7).map_err(|e| err(e.to_string()))?; // reserved

    if splice_event_cancel_indicator {
        return Ok(SpliceInsert { splice_event_id, splice_event_cancel_indicator, scheduled_event: None });
    }

    let out_of_network_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    let program_splice_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    let duration_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    let splice_immediate_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(4).map_err(|e| err(e.to_string()))?; // reserved

    let splice_time = if program_splice_flag && !splice_immediate_flag {
        Some(parse_splice_time(r, pts_adjustment)?)
    } else {
        None
    };

    if !program_splice_flag {
        let component_count = r.read_u8().map_err(|e| err(e.to_string()))?;
        for _ in 0..component_count {
            r.skip_bits(8).map_err(|e| err(e.to_string()))?; // component_tag
            if !splice_immediate_flag {
                parse_splice_time(r, pts_adjustment)?;
            }
        }
    }

    let break_duration = if duration_flag { Some(parse_break_duration(r)?) } else { None };

    let unique_program_id = r.read_u16_be().map_err(|e| err(e.to_string()))?;
    let avail_num = r.read_u8().map_err(|e| err(e.to_string()))?;
    let avails_expected = r.read_u8().map_err(|e| err(e.to_string()))?;

    Ok(SpliceInsert {
        splice_event_id,
        splice_event_cancel_indicator,
        scheduled_event: Some(ScheduledEvent {
            out_of_network_indicator,
            program_splice_flag,
            splice_immediate_flag,
            splice_time,
            break_duration,
            unique_program_id,
            avail_num,
            avails_expected,
        }),
    })
}

const SEGMENTATION_DESCRIPTOR_TAG: u8 = 0x02;
const CUEI_IDENTIFIER: u32 = 0x4355_4549; // "CUEI"

fn parse_splice_descriptor(r: &mut ByteReader, _pts_adjustment: u64) -> Result<SpliceDescriptor, DecodeError> {
    let tag = r.read_u8().map_err(|e| err(e.to_string()))?;
    let length = r.read_u8().map_err(|e| err(e.to_string()))? as usize;
    let descriptor_end_bit = r.bit_offset() + length * 8;

    let identifier = r.read_u32_be().map_err(|e| err(e.to_string()))?;

    let payload = if tag == SEGMENTATION_DESCRIPTOR_TAG && identifier == CUEI_IDENTIFIER {
        SpliceDescriptorPayload::Segmentation(parse_segmentation_descriptor(r)?)
    } else {
        let remaining_bits = descriptor_end_bit.saturating_sub(r.bit_offset());
        let remaining_bytes = remaining_bits / 8;
        let bytes = r.read_bytes(remaining_bytes).map_err(|e| err(e.to_string()))?.to_vec();
        SpliceDescriptorPayload::Unknown(bytes)
    };

    // Defensive: if the typed parser consumed fewer bits than `length`
    // declares (unknown descriptor sub-version), skip the rest so the loop
    // stays in sync.
    if r.bit_offset() < descriptor_end_bit {
        r.skip_bits((descriptor_end_bit - r.bit_offset()) as u32).map_err(|e| err(e.to_string()))?;
    }

    Ok(SpliceDescriptor { tag, identifier, payload })
}

fn parse_segmentation_descriptor(r: &mut ByteReader) -> Result<SegmentationDescriptor, DecodeError> {
    let segmentation_event_id = r.read_u32_be().map_err(|e| err(e.to_string()))?;
    let segmentation_event_cancel_indicator = r.read_flag().map_err(|e| err(e.to_string()))?;
    r.skip_bits(7).map_err(|e| err(e.to_string()))?; // reserved

    if segmentation_event_cancel_indicator {
        return Ok(SegmentationDescriptor {
            segmentation_event_id,
            segmentation_event_cancel_indicator,
            program_segmentation_flag: false,
            segmentation_duration_90k: None,
            upid_type: 0,
            upid: Vec::new(),
            segmentation_type_id: 0,
            segment_num: 0,
            segments_expected: 0,
        });
    }

    let program_segmentation_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    let segmentation_duration_flag = r.read_flag().map_err(|e| err(e.to_string()))?;
    let delivery_not_restricted_flag = r.read_flag().map_err(|e| err(e.to_string()))?;

    if delivery_not_restricted_flag {
        r.skip_bits(5).map_err(|e| err(e.to_string()))?; // reserved
    } else {
        r.skip_bits(4).map_err(|e| err(e.to_string()))?; // web_delivery/regional/archive flags
        r.skip_bits(1).map_err(|e| err(e.to_string()))?; // reserved inside device_restrictions
    }

    if !program_segmentation_flag {
        let component_count = r.read_u8().map_err(|e| err(e.to_string()))?;
        for _ in 0..component_count {
            r.skip_bits(8).map_err(|e| err(e.to_string()))?; // component_tag
            r.skip_bits(7).map_err(|e| err(e.to_string()))?; // reserved
            r.skip_bits(33).map_err(|e| err(e.to_string()))?; // pts_offset
        }
    }

    let segmentation_duration_90k = if segmentation_duration_flag {
        Some(r.read_u40_be().map_err(|e| err(e.to_string()))?)
    } else {
        None
    };

    let upid_type = r.read_u8().map_err(|e| err(e.to_string()))?;
    let upid_length = r.read_u8().map_err(|e| err(e.to_string()))? as usize;
    let upid = r.read_bytes(upid_length).map_err(|e| err(e.to_string()))?.to_vec();

    let segmentation_type_id = r.read_u8().map_err(|e| err(e.to_string()))?;
    let segment_num = r.read_u8().map_err(|e| err(e.to_string()))?;
    let segments_expected = r.read_u8().map_err(|e| err(e.to_string()))?;

    Ok(SegmentationDescriptor {
        segmentation_event_id,
        segmentation_event_cancel_indicator,
        program_segmentation_flag,
        segmentation_duration_90k,
        upid_type,
        upid,
        segmentation_type_id,
        segment_num,
        segments_expected,
    })
}
