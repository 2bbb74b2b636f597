use base64::Engine as _;
use bytes::Bytes;
use log::debug;

use super::types::{NALUnitType, SPSInfo};
use crate::utils::BitReader;
use crate::{PipeError, Result};

/// Strips `00 00 03` emulation prevention bytes from an RBSP.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Parses an SPS NAL unit, header byte included.
pub fn parse_sps(nal: &[u8]) -> Result<SPSInfo> {
    if nal.len() < 4 || NALUnitType::from(nal[0]) != NALUnitType::SPS {
        return Err(PipeError::InvalidData("not an SPS NAL unit".into()));
    }
    let rbsp = remove_emulation_prevention(&nal[1..]);
    let mut reader = BitReader::new(&rbsp);

    let profile_idc = reader.read_bits(8)? as u8;
    let constraint_flags = reader.read_bits(8)? as u8;
    let level_idc = reader.read_bits(8)? as u8;
    reader.read_golomb()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = reader.read_golomb()?;
        if chroma_format_idc == 3 {
            reader.skip_bits(1)?; // separate_colour_plane_flag
        }
        reader.read_golomb()?; // bit_depth_luma_minus8
        reader.read_golomb()?; // bit_depth_chroma_minus8
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_bit()? {
            let lists = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..lists {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_golomb()?; // log2_max_frame_num_minus4
    match reader.read_golomb()? {
        0 => {
            reader.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            reader.skip_bits(1)?;
            reader.read_signed_golomb()?;
            reader.read_signed_golomb()?;
            for _ in 0..reader.read_golomb()? {
                reader.read_signed_golomb()?;
            }
        }
        _ => {}
    }

    reader.read_golomb()?; // max_num_ref_frames
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = reader.read_golomb()? + 1;
    let height_in_map_units = reader.read_golomb()? + 1;
    let frame_mbs_only = reader.read_bit()?;
    if !frame_mbs_only {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let mut width = width_in_mbs * 16;
    let mut height = (2 - frame_mbs_only as u32) * height_in_map_units * 16;

    if reader.read_bit()? {
        let left = reader.read_golomb()?;
        let right = reader.read_golomb()?;
        let top = reader.read_golomb()?;
        let bottom = reader.read_golomb()?;
        let (crop_x, crop_y) = match chroma_format_idc {
            0 => (1, 2 - frame_mbs_only as u32),
            1 => (2, 2 * (2 - frame_mbs_only as u32)),
            2 => (2, 2 - frame_mbs_only as u32),
            _ => (1, 2 - frame_mbs_only as u32),
        };
        width = width.saturating_sub((left + right) * crop_x);
        height = height.saturating_sub((top + bottom) * crop_y);
    }

    debug!(
        "SPS profile={} level={} {}x{}",
        profile_idc, level_idc, width, height
    );

    Ok(SPSInfo {
        profile_idc,
        constraint_flags,
        level_idc,
        width,
        height,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Decodes `sprop-parameter-sets` into (SPS list, PPS list).
pub fn parse_sprop_parameter_sets(value: &str) -> Result<(Vec<Bytes>, Vec<Bytes>)> {
    let mut sps = Vec::new();
    let mut pps = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let nal = base64::engine::general_purpose::STANDARD
            .decode(item)
            .map_err(|e| PipeError::InvalidData(format!("sprop-parameter-sets: {}", e)))?;
        match nal.first().map(|&h| NALUnitType::from(h)) {
            Some(NALUnitType::SPS) => sps.push(Bytes::from(nal)),
            Some(NALUnitType::PPS) => pps.push(Bytes::from(nal)),
            _ => debug!("Ignoring non-parameter-set NAL in sprop-parameter-sets"),
        }
    }
    Ok((sps, pps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Baseline profile, level 3.0, 640x480
    const SPS_640X480: [u8; 9] = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40];

    #[test]
    fn test_remove_emulation_prevention() {
        let data = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00];
        assert_eq!(remove_emulation_prevention(&data), vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_sps_dimensions() {
        let info = parse_sps(&SPS_640X480).unwrap();
        assert_eq!(info.profile_idc, 66);
        assert_eq!(info.level_idc, 30);
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn test_parse_sps_rejects_other_nal() {
        assert!(parse_sps(&[0x68, 0xCE, 0x38, 0x80]).is_err());
    }

    #[test]
    fn test_sprop_parameter_sets() {
        let (sps, pps) = parse_sprop_parameter_sets("Z0LAHtoCgPZA,aM44gA==").unwrap();
        assert_eq!(sps.len(), 1);
        assert_eq!(&sps[0][..], &SPS_640X480[..]);
        assert_eq!(&pps[0][..], &[0x68, 0xCE, 0x38, 0x80]);
    }
}
