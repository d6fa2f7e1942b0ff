//! Structures mirroring the SCTE-35 `splice_info_section` binary layout.
//!
//! Field names follow the standard's own notation so the parser in
//! `binary.rs` reads like the spec table it implements.

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInfoSection {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub sap_type: u8,
    pub section_length: u16,
    pub protocol_version: u8,
    pub encrypted_packet: bool,
    pub encryption_algorithm: u8,
    /// 33-bit PTS adjustment, already masked to 33 bits.
    pub pts_adjustment: u64,
    pub cw_index: u8,
    pub tier: u16,
    pub splice_command_length: u16,
    pub splice_command_type: u8,
    pub splice_command: SpliceCommand,
    pub splice_descriptors: Vec<SpliceDescriptor>,
    pub crc_32: u32,
    pub crc_valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceCommand {
    SpliceNull,
    SpliceSchedule(SpliceSchedule),
    SpliceInsert(SpliceInsert),
    TimeSignal(TimeSignal),
    BandwidthReservation,
    PrivateCommand { identifier: u32, data: Vec<u8> },
    Unknown { command_type: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceTime {
    pub time_specified: bool,
    /// Already adjusted by `pts_adjustment` and wrapped mod 2^33.
    pub pts_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakDuration {
    pub auto_return: bool,
    pub duration_90k: u64,
}

impl BreakDuration {
    pub fn duration_seconds(&self) -> f64 {
        self.duration_90k as f64 / 90_000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceSchedule {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub scheduled_splice_time: Option<u64>,
    pub splice_duration_90k: Option<u32>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInsert {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub scheduled_event: Option<ScheduledEvent>,
}

impl SpliceInsert {
    pub fn is_cancelled(&self) -> bool {
        self.scheduled_event.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    pub splice_time: Option<SpliceTime>,
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSignal {
    pub splice_time: SpliceTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceDescriptor {
    pub tag: u8,
    pub identifier: u32,
    pub payload: SpliceDescriptorPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceDescriptorPayload {
    Segmentation(SegmentationDescriptor),
    Unknown(Vec<u8>),
}

/// `segmentation_type_id` values that mark an ad-break *start* when carried
/// in either binary segmentation descriptors or `X-SEGMENTATION-TYPE-ID`
/// DATERANGE attributes (§4.1).
pub const SEGMENTATION_TYPE_BREAK_START: [u8; 5] = [0x22, 0x30, 0x32, 0x34, 0x36];

/// Corresponding `*-IN` / break-end type ids (Break End, Provider/Distributor
/// Placement Opportunity End, ...).
pub const SEGMENTATION_TYPE_BREAK_END: [u8; 5] = [0x23, 0x31, 0x33, 0x35, 0x37];

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationDescriptor {
    pub segmentation_event_id: u32,
    pub segmentation_event_cancel_indicator: bool,
    pub program_segmentation_flag: bool,
    pub segmentation_duration_90k: Option<u64>,
    pub upid_type: u8,
    pub upid: Vec<u8>,
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
}

impl SegmentationDescriptor {
    pub fn is_break_start(&self) -> bool {
        SEGMENTATION_TYPE_BREAK_START.contains(&self.segmentation_type_id)
    }

    pub fn is_break_end(&self) -> bool {
        SEGMENTATION_TYPE_BREAK_END.contains(&self.segmentation_type_id)
    }
}
