use super::types::{index_from_sample_rate, AudioSpecificConfig, ProfileType};
use crate::utils::BitReader;
use crate::{PipeError, Result};

/// Parses a binary AudioSpecificConfig.
pub fn parse_audio_specific_config(data: &[u8]) -> Result<AudioSpecificConfig> {
    let mut reader = BitReader::new(data);

    let mut object_type = reader.read_bits(5)? as u8;
    if object_type == 31 {
        object_type = 32 + reader.read_bits(6)? as u8;
    }

    let sample_rate_index = reader.read_bits(4)? as u8;
    let explicit_sample_rate = if sample_rate_index == 15 {
        Some(reader.read_bits(24)?)
    } else {
        None
    };
    let channel_configuration = reader.read_bits(4)? as u8;

    Ok(AudioSpecificConfig {
        profile: ProfileType::from(object_type),
        sample_rate_index,
        explicit_sample_rate,
        channel_configuration,
        raw: data.to_vec(),
    })
}

/// Parses the hex string carried in `fmtp ... config=1190`.
pub fn parse_config_hex(hex: &str) -> Result<AudioSpecificConfig> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(PipeError::InvalidData(format!("bad AAC config '{}'", hex)));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()?;
    parse_audio_specific_config(&bytes)
}

/// Builds a two-byte AAC-LC config for streams that announce no `config=`.
pub fn synthesize_config(sample_rate: u32, channels: u8) -> Result<AudioSpecificConfig> {
    let index = index_from_sample_rate(sample_rate).ok_or_else(|| {
        PipeError::InvalidData(format!("no AAC sampling index for {} Hz", sample_rate))
    })?;
    let object_type = ProfileType::LC as u16;
    let word = (object_type << 11) | ((index as u16) << 7) | ((channels as u16 & 0x0f) << 3);
    parse_audio_specific_config(&word.to_be_bytes())
}
