//! # H.264/AVC helpers
//!
//! NAL unit classification for RTP depacketization, and parameter-set parsing for
//! building the `avc1` sample entry.
//!
//! ```rust
//! use rtspipe::codec::h264::{parse_sprop_parameter_sets, parse_sps};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (sps, _pps) = parse_sprop_parameter_sets("Z0LAHtoCgPZA,aM44gA==")?;
//! let info = parse_sps(&sps[0])?;
//! assert_eq!((info.width, info.height), (640, 480));
//! # Ok(())
//! # }
//! ```

/// Parameter-set parsing
pub mod parser;
/// NAL unit types
pub mod types;

#[doc(inline)]
pub use parser::*;
#[doc(inline)]
pub use types::*;
