//! AAC configuration helpers used to describe `mp4a` tracks.

mod parser;
mod types;

pub use parser::{parse_audio_specific_config, parse_config_hex, synthesize_config};
pub use types::*;
