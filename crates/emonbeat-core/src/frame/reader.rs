use super::error::FrameError;
use super::layout::FIELD_LEN;

/// Bounds-checked field access over a token frame.
pub struct FrameReader<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, FrameError> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| self.too_short(offset + 1))
    }

    /// Read the field starting at `offset`, low byte first.
    pub fn read_u16_le(&self, offset: usize) -> Result<u16, FrameError> {
        let end = offset + FIELD_LEN;
        match self.bytes.get(offset..end) {
            Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(self.too_short(end)),
        }
    }

    pub fn read_scaled_u16_le(&self, offset: usize, scale: f32) -> Result<f32, FrameError> {
        let raw = self.read_u16_le(offset)?;
        Ok(f32::from(raw) / scale)
    }

    fn too_short(&self, needed: usize) -> FrameError {
        FrameError::TooShort {
            needed,
            actual: self.bytes.len(),
        }
    }
}
