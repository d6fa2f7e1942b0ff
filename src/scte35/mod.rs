//! SCTE-35 cueing: binary `splice_info_section` decoding, DATERANGE
//! attribute recognition, CRC-32/MPEG-2 validation, and the normalized
//! signal shape consumed by the HLS rewriter and channel coordinator.

pub mod attributes;
pub mod binary;
pub mod byte_reader;
pub mod crc;
pub mod signal;
pub mod types;

pub use attributes::{recognize, AttributeSignal};
pub use binary::{decode_base64, parse_splice_info_section, DecodeError};
pub use signal::{
    from_attribute_signal, from_binary_payload, validate, Scte35Signal, SignalSource, SignalValidation,
};
pub use types::*;
