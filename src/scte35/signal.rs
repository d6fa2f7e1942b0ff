//! Unifies binary `splice_info_section` decodes and DATERANGE attribute
//! recognition into one [`Scte35Signal`] shape the rewriter and coordinator
//! consume, independent of which form the source manifest used.
//!
//! When both forms are present on the same marker (an `EXT-X-DATERANGE` that
//! also carries a `SCTE35-OUT` payload), the binary-derived duration and
//! type id win on any disagreement — the binary payload is the
//! authoritative SCTE-35 message, the attributes are a convenience
//! projection of it (§3, §4.1).

use super::attributes::{self, AttributeSignal};
use super::binary::{self, DecodeError};
use super::types::{SegmentationDescriptor, SpliceCommand, SpliceDescriptorPayload, SpliceInfoSection};

#[derive(Debug, Clone, PartialEq)]
pub enum SignalSource {
    Binary,
    Attribute,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scte35Signal {
    /// Stable identity for dedup: the DATERANGE id when present, otherwise
    /// the splice_event_id / segmentation_event_id.
    pub event_id: String,
    pub is_start: bool,
    pub duration_seconds: Option<f64>,
    pub segmentation_type_id: Option<u8>,
    pub source: SignalSource,
    pub section: Option<SpliceInfoSection>,
    pub crc_warning: bool,
}

/// Validation outcome for a decoded signal, per §4.1's critical/warning split.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValidation {
    pub critical_errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SignalValidation {
    pub fn is_usable(&self) -> bool {
        self.critical_errors.is_empty()
    }
}

/// Builds a signal purely from a decoded binary section (e.g. an inline
/// `SCTE35-CMD` on its own, no surrounding DATERANGE attributes).
pub fn from_binary_payload(event_id: String, payload: &str) -> Result<(Scte35Signal, SignalValidation), DecodeError> {
    let bytes = binary::decode_base64(payload)?;
    let section = binary::parse_splice_info_section(&bytes)?;
    let validation = validate(&section);

    let (is_start, duration_seconds, segmentation_type_id) = summarize_section(&section);

    Ok((
        Scte35Signal {
            event_id,
            is_start,
            duration_seconds,
            segmentation_type_id,
            source: SignalSource::Binary,
            crc_warning: !section.crc_valid,
            section: Some(section),
        },
        validation,
    ))
}

/// Builds a signal from a recognized DATERANGE attribute set, decoding its
/// embedded binary payload (if any) to resolve conflicts in favor of it.
pub fn from_attribute_signal(attr: AttributeSignal) -> (Scte35Signal, SignalValidation) {
    let mut validation = SignalValidation { critical_errors: Vec::new(), warnings: Vec::new() };

    let mut is_start = attr.is_start;
    let mut duration_seconds = attr.duration_seconds;
    let mut segmentation_type_id = attr.segmentation_type_id;
    let mut section = None;
    let mut source = SignalSource::Attribute;
    let mut crc_warning = false;

    if let Some(payload) = &attr.binary_payload {
        match binary::decode_base64(payload).and_then(|b| binary::parse_splice_info_section(&b)) {
            Ok(decoded) => {
                let section_validation = validate(&decoded);
                let (bin_start, bin_duration, bin_type) = summarize_section(&decoded);

                is_start = bin_start;
                if let Some(d) = bin_duration {
                    duration_seconds = Some(d);
                }
                if bin_type.is_some() {
                    segmentation_type_id = bin_type;
                }
                crc_warning = !decoded.crc_valid;
                source = SignalSource::Both;
                validation.critical_errors.extend(section_validation.critical_errors);
                validation.warnings.extend(section_validation.warnings);
                section = Some(decoded);
            }
            Err(e) => {
                validation.warnings.push(format!("attribute carried undecodable binary payload: {e}"));
            }
        }
    }

    (
        Scte35Signal {
            event_id: attr.id.clone(),
            is_start,
            duration_seconds,
            segmentation_type_id,
            source,
            section,
            crc_warning,
        },
        validation,
    )
}

pub use attributes::recognize as recognize_daterange;

fn summarize_section(section: &SpliceInfoSection) -> (bool, Option<f64>, Option<u8>) {
    match &section.splice_command {
        SpliceCommand::SpliceInsert(insert) => {
            let is_start = insert
                .scheduled_event
                .as_ref()
                .map(|e| e.out_of_network_indicator)
                .unwrap_or(false);
            let duration = insert
                .scheduled_event
                .as_ref()
                .and_then(|e| e.break_duration.as_ref())
                .map(|d| d.duration_seconds());
            (is_start, duration, segmentation_type_from_descriptors(section))
        }
        SpliceCommand::TimeSignal(_) => {
            let seg = find_segmentation(section);
            let is_start = seg.map(|s| s.is_break_start()).unwrap_or(false);
            let duration = seg.and_then(|s| s.segmentation_duration_90k).map(|d| d as f64 / 90_000.0);
            (is_start, duration, seg.map(|s| s.segmentation_type_id))
        }
        _ => (false, None, segmentation_type_from_descriptors(section)),
    }
}

fn find_segmentation(section: &SpliceInfoSection) -> Option<&SegmentationDescriptor> {
    section.splice_descriptors.iter().find_map(|d| match &d.payload {
        SpliceDescriptorPayload::Segmentation(seg) => Some(seg),
        _ => None,
    })
}

fn segmentation_type_from_descriptors(section: &SpliceInfoSection) -> Option<u8> {
    find_segmentation(section).map(|s| s.segmentation_type_id)
}

/// Validates a decoded `splice_info_section` against the critical/warning
/// rules enumerated in §4.1.
pub fn validate(section: &SpliceInfoSection) -> SignalValidation {
    let mut critical_errors = Vec::new();
    let mut warnings = Vec::new();

    if section.table_id != 0xFC {
        critical_errors.push(format!("table_id 0x{:02X} != 0xFC", section.table_id));
    }
    if section.encrypted_packet {
        warnings.push("encrypted_packet flag set; payload cannot be fully validated".to_string());
    }
    if !section.crc_valid {
        warnings.push("CRC_32 mismatch".to_string());
    }

    match &section.splice_command {
        SpliceCommand::SpliceInsert(insert) => {
            if let Some(event) = &insert.scheduled_event {
                if event.break_duration.is_none() {
                    warnings.push("splice_insert has no break_duration; downstream default will apply".to_string());
                }
                if event.program_splice_flag && !event.splice_immediate_flag && event.splice_time.is_none() {
                    critical_errors.push("program_splice_flag set without splice_time or immediate flag".to_string());
                }
            }
        }
        SpliceCommand::TimeSignal(ts) => {
            if !ts.splice_time.time_specified {
                warnings.push("time_signal has no time_specified_flag; treating as immediate".to_string());
            }
            if find_segmentation(section).is_none() {
                warnings.push("time_signal carries no segmentation_descriptor; cue intent is ambiguous".to_string());
            }
        }
        SpliceCommand::Unknown { command_type } => {
            warnings.push(format!("unrecognized splice_command_type 0x{command_type:02X}"));
        }
        _ => {}
    }

    SignalValidation { critical_errors, warnings }
}
