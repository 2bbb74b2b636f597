//! # Utility Functions and Types
//!
//! Bit-level reading shared by the codec parsers and the AAC depacketizer.
//!
//! ```rust
//! use rtspipe::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//! let value = reader.read_bits(3)?;
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bitstream reading
pub mod bits;

pub use bits::BitReader;
