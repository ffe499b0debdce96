pub const LINE_TERMINATOR: [u8; 2] = [0x0d, 0x0a];

/// Every multi-byte field is a little-endian u16.
pub const FIELD_LEN: usize = 2;

pub const NODE_OFFSET: usize = 0;
pub const POWER1_OFFSET: usize = 1;
pub const POWER2_OFFSET: usize = 3;
pub const POWER3_OFFSET: usize = 5;
pub const POWER4_OFFSET: usize = 7;
pub const VRMS_OFFSET: usize = 9;

pub const MIN_FRAME_LEN: usize = VRMS_OFFSET + FIELD_LEN;
pub const DEFAULT_NODE: u16 = 10;

/// The wire carries RMS voltage multiplied by this factor.
pub const VRMS_SCALE: f32 = 100.0;
