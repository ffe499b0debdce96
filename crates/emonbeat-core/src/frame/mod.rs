//! Serial frame decoding.
//!
//! A frame is one CRLF-terminated ASCII line of space-separated decimal
//! bytes. The tokenizer turns the line into bytes; the parser validates the
//! length and node id, then decodes little-endian u16 fields. There is no
//! checksum on the wire, so corruption that survives tokenizing is decoded
//! as-is.
//!
//! Byte offsets live in `layout`, bounds-checked access in `reader`.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;
pub mod tokenizer;

pub use error::FrameError;
pub use parser::{Decoded, FrameDecoder, IgnoreReason};
pub use tokenizer::tokenize;
