use super::error::FrameError;
use super::layout;
use super::reader::FrameReader;
use crate::Reading;

/// Why a structurally valid line produced no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Fewer tokens than the fixed frame layout needs.
    TooShort { actual: usize },
    /// The frame came from another node on the bus.
    ForeignNode { node: u16 },
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::TooShort { actual } => write!(
                f,
                "frame too short ({actual} of {} tokens)",
                layout::MIN_FRAME_LEN
            ),
            IgnoreReason::ForeignNode { node } => write!(f, "frame from node {node}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Reading(Reading),
    Ignored(IgnoreReason),
}

/// Decodes token frames for a single expected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    expected_node: u16,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(layout::DEFAULT_NODE)
    }
}

impl FrameDecoder {
    pub fn new(expected_node: u16) -> Self {
        Self { expected_node }
    }

    /// Decode a token frame into a reading.
    ///
    /// Short frames and frames from other nodes are `Decoded::Ignored`, never
    /// errors. Tokens past the fixed layout are not inspected. Field reads
    /// stay bounds-checked, so a layout longer than `MIN_FRAME_LEN` surfaces
    /// as `FrameError::TooShort` instead of a panic.
    ///
    /// # Examples
    /// ```
    /// use emonbeat_core::frame::{Decoded, FrameDecoder};
    ///
    /// let tokens: [u8; 11] = [10, 44, 1, 88, 2, 132, 3, 176, 4, 220, 5];
    /// let Decoded::Reading(reading) = FrameDecoder::default().decode(&tokens).unwrap() else {
    ///     panic!("expected a reading");
    /// };
    /// assert_eq!(reading.power1, 300);
    /// assert!((reading.vrms - 15.0).abs() < f32::EPSILON);
    /// ```
    pub fn decode(&self, tokens: &[u8]) -> Result<Decoded, FrameError> {
        if tokens.len() < layout::MIN_FRAME_LEN {
            return Ok(Decoded::Ignored(IgnoreReason::TooShort {
                actual: tokens.len(),
            }));
        }

        let reader = FrameReader::new(tokens);
        let node = u16::from(reader.read_u8(layout::NODE_OFFSET)?);
        if node != self.expected_node {
            return Ok(Decoded::Ignored(IgnoreReason::ForeignNode { node }));
        }

        Ok(Decoded::Reading(Reading {
            node,
            power1: reader.read_u16_le(layout::POWER1_OFFSET)?,
            power2: reader.read_u16_le(layout::POWER2_OFFSET)?,
            power3: reader.read_u16_le(layout::POWER3_OFFSET)?,
            power4: reader.read_u16_le(layout::POWER4_OFFSET)?,
            vrms: reader.read_scaled_u16_le(layout::VRMS_OFFSET, layout::VRMS_SCALE)?,
        }))
    }
}
