//! Recognizes SCTE-35 cue signals carried as `EXT-X-DATERANGE` attributes,
//! per §4.1's attribute-form recognition rules.
//!
//! A DATERANGE is treated as a splice-out marker when any of:
//! - it carries `SCTE35-OUT` (or `SCTE35-CMD`, paired with `SCTE35-IN` for
//!   the end marker)
//! - its `CLASS` is `com.apple.hls.scte35.out` (or `.in` for the end marker)
//! - its `X-SEGMENTATION-TYPE-ID` matches a known break-start type id
//!
//! Duration is resolved via the fallback chain: `DURATION`, then
//! `PLANNED-DURATION`, then `X-BREAK-DURATION`, then the binary
//! `break_duration` carried in `SCTE35-OUT`/`SCTE35-CMD` (if decodable),
//! then the channel's configured default.

use m3u8_rs::DateRange;

use super::binary::{decode_base64, parse_splice_info_section};
use super::types::{SegmentationDescriptor, SpliceCommand, SpliceDescriptorPayload};

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSignal {
    pub id: String,
    pub is_start: bool,
    pub segmentation_type_id: Option<u8>,
    pub duration_seconds: Option<f64>,
    pub binary_payload: Option<String>,
}

const CLASS_OUT: &str = "com.apple.hls.scte35.out";
const CLASS_IN: &str = "com.apple.hls.scte35.in";

fn other_attr<'a>(dr: &'a DateRange, name: &str) -> Option<&'a str> {
    dr.other_attributes.as_ref()?.get(name).map(|s| s.as_str())
}

fn x_attr_str<'a>(dr: &'a DateRange, name: &str) -> Option<String> {
    dr.x_prefixed.as_ref()?.get(name).map(|v| match v {
        m3u8_rs::QuotedOrUnquoted::Quoted(s) => s.trim_matches('"').to_string(),
        m3u8_rs::QuotedOrUnquoted::Unquoted(s) => s.clone(),
    })
}

fn x_attr_f64(dr: &DateRange, name: &str) -> Option<f64> {
    x_attr_str(dr, name).and_then(|s| s.parse::<f64>().ok())
}

fn parse_type_id(raw: &str) -> Option<u8> {
    let trimmed = raw.trim().trim_matches('"');
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<u8>().ok()
    }
}

/// Attempts to interpret a single `#EXT-X-DATERANGE` tag as a SCTE-35 signal.
/// Returns `None` when the DATERANGE carries none of the recognized markers.
pub fn recognize(dr: &DateRange) -> Option<AttributeSignal> {
    let class = dr.class.as_deref();
    let scte35_out = other_attr(dr, "SCTE35-OUT").or_else(|| other_attr(dr, "SCTE35-CMD"));
    let scte35_in = other_attr(dr, "SCTE35-IN");
    let type_id = x_attr_str(dr, "X-SEGMENTATION-TYPE-ID").as_deref().and_then(parse_type_id);

    let is_start = scte35_out.is_some()
        || class == Some(CLASS_OUT)
        || type_id.map(is_break_start_type).unwrap_or(false);
    let is_end = scte35_in.is_some()
        || class == Some(CLASS_IN)
        || type_id.map(is_break_end_type).unwrap_or(false);

    if !is_start && !is_end {
        return None;
    }

    let binary_payload = scte35_out.or(scte35_in).map(|s| s.to_string());
    let binary_duration = binary_payload
        .as_deref()
        .and_then(decode_binary_duration_seconds);

    let duration_seconds = dr
        .duration
        .or(dr.planned_duration)
        .or_else(|| x_attr_f64(dr, "X-BREAK-DURATION"))
        .or(binary_duration);

    Some(AttributeSignal {
        id: dr.id.clone(),
        is_start: is_start && !is_end,
        segmentation_type_id: type_id,
        duration_seconds,
        binary_payload,
    })
}

fn decode_binary_duration_seconds(payload: &str) -> Option<f64> {
    let bytes = decode_base64(payload).ok()?;
    let section = parse_splice_info_section(&bytes).ok()?;
    match &section.splice_command {
        SpliceCommand::SpliceInsert(insert) => insert
            .scheduled_event
            .as_ref()
            .and_then(|e| e.break_duration.as_ref())
            .map(|d| d.duration_seconds()),
        _ => section.splice_descriptors.iter().find_map(|d| match &d.payload {
            SpliceDescriptorPayload::Segmentation(seg) => segmentation_duration_seconds(seg),
            _ => None,
        }),
    }
}

fn segmentation_duration_seconds(seg: &SegmentationDescriptor) -> Option<f64> {
    seg.segmentation_duration_90k.map(|d| d as f64 / 90_000.0)
}

fn is_break_start_type(id: u8) -> bool {
    super::types::SEGMENTATION_TYPE_BREAK_START.contains(&id)
}

fn is_break_end_type(id: u8) -> bool {
    super::types::SEGMENTATION_TYPE_BREAK_END.contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_daterange(class: Option<&str>) -> DateRange {
        DateRange {
            id: "break-1".to_string(),
            class: class.map(|s| s.to_string()),
            start_date: "2026-07-27T00:00:00Z".to_string(),
            end_date: None,
            duration: None,
            planned_duration: None,
            x_prefixed: None,
            end_on_next: false,
            other_attributes: None,
        }
    }

    #[test]
    fn recognizes_class_based_out_marker() {
        let dr = base_daterange(Some(CLASS_OUT));
        let sig = recognize(&dr).expect("should recognize");
        assert!(sig.is_start);
    }

    #[test]
    fn ignores_unrelated_daterange() {
        let dr = base_daterange(Some("some.other.class"));
        assert!(recognize(&dr).is_none());
    }

    #[test]
    fn duration_fallback_prefers_duration_field() {
        let mut dr = base_daterange(Some(CLASS_OUT));
        dr.duration = Some(30.0);
        let sig = recognize(&dr).unwrap();
        assert_eq!(sig.duration_seconds, Some(30.0));
    }

    #[test]
    fn duration_fallback_to_x_break_duration() {
        let mut dr = base_daterange(Some(CLASS_OUT));
        let mut x = HashMap::new();
        x.insert(
            "X-BREAK-DURATION".to_string(),
            m3u8_rs::QuotedOrUnquoted::Unquoted("45.5".to_string()),
        );
        dr.x_prefixed = Some(x);
        let sig = recognize(&dr).unwrap();
        assert_eq!(sig.duration_seconds, Some(45.5));
    }

    #[test]
    fn segmentation_type_id_recognized_as_start() {
        let mut dr = base_daterange(None);
        let mut x = HashMap::new();
        x.insert(
            "X-SEGMENTATION-TYPE-ID".to_string(),
            m3u8_rs::QuotedOrUnquoted::Unquoted("0x22".to_string()),
        );
        dr.x_prefixed = Some(x);
        let sig = recognize(&dr).unwrap();
        assert!(sig.is_start);
    }
}
