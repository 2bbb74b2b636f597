use crate::error::{PipeError, Result};

/// MSB-first bit reader over a byte slice.
///
/// Used for H.264 parameter sets (exp-Golomb fields), AAC AudioSpecificConfig and
/// the RFC 3640 AU-header section.
///
/// ```
/// use rtspipe::utils::BitReader;
///
/// let data = [0b1011_0011];
/// let mut reader = BitReader::new(&data);
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    fn underrun(&self, wanted: usize) -> PipeError {
        PipeError::InvalidData(format!(
            "bitstream underrun: wanted {} bits at bit {}, {} available",
            wanted,
            self.pos,
            self.available_bits()
        ))
    }

    /// Reads one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.pos / 8).ok_or_else(|| self.underrun(1))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 32 bits, big-endian.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(PipeError::InvalidData(format!("cannot read {} bits into u32", n)));
        }
        let n = n as usize;
        if n > self.available_bits() {
            return Err(self.underrun(n));
        }

        let mut value = 0u64;
        let mut left = n;
        while left > 0 {
            let byte = self.data[self.pos / 8];
            let used = self.pos % 8;
            let take = (8 - used).min(left);
            let chunk = (byte >> (8 - used - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | chunk as u64;
            self.pos += take;
            left -= take;
        }
        Ok(value as u32)
    }

    /// Reads an unsigned exp-Golomb code, `ue(v)`.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut zeros = 0u32;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 31 {
                return Err(PipeError::InvalidData("exp-Golomb prefix too long".into()));
            }
        }
        if zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(zeros)?;
        Ok(((1u64 << zeros) - 1 + suffix as u64) as u32)
    }

    /// Reads a signed exp-Golomb code, `se(v)`. Odd codes are positive.
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()? as i64;
        let magnitude = (k + 1) / 2;
        Ok(if k % 2 == 1 { magnitude } else { -magnitude } as i32)
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        let n = n as usize;
        if n > self.available_bits() {
            return Err(self.underrun(n));
        }
        self.pos += n;
        Ok(())
    }

    /// Moves to the next byte boundary.
    pub fn align_byte(&mut self) {
        self.pos = (self.pos + 7) / 8 * 8;
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    /// Packs exp-Golomb codes MSB-first.
    fn encode_golomb(values: &[u32]) -> Vec<u8> {
        let mut bits = Vec::new();
        for &value in values {
            let code = value as u64 + 1;
            let len = 64 - code.leading_zeros() as usize;
            bits.extend(std::iter::repeat(false).take(len - 1));
            bits.extend((0..len).rev().map(|i| (code >> i) & 1 == 1));
        }
        bits.chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &b)| acc | ((b as u8) << (7 - i)))
            })
            .collect()
    }

    #[test]
    fn test_read_bits_across_bytes() {
        let data = [0b1011_0011, 0b1100_1100, 0b1010_1010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b1001_1110);
        assert_eq!(reader.read_bits(0).unwrap(), 0);
        assert_eq!(reader.read_bits(13).unwrap(), 0b0_1100_1010_1010);
        assert_eq!(reader.available_bits(), 0);
        assert!(reader.read_bit().is_err());
    }

    #[test]
    fn test_read_golomb_known_codes() {
        let cases: [(u8, u32); 6] = [
            (0b1000_0000, 0),
            (0b0100_0000, 1),
            (0b0110_0000, 2),
            (0b0010_0000, 3),
            (0b0011_1000, 6),
            (0b0001_0010, 8),
        ];
        for (byte, expected) in cases {
            let data = [byte];
            assert_eq!(BitReader::new(&data).read_golomb().unwrap(), expected);
        }
        assert!(BitReader::new(&[0u8; 5]).read_golomb().is_err());
    }

    #[test]
    fn test_signed_golomb_mapping() {
        let data = encode_golomb(&[0, 1, 2, 3, 4]);
        let mut reader = BitReader::new(&data);
        let decoded: Vec<i32> = (0..5).map(|_| reader.read_signed_golomb().unwrap()).collect();
        assert_eq!(decoded, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_skip_and_align() {
        let data = [0xFF, 0x5A];
        let mut reader = BitReader::new(&data);
        reader.skip_bits(3).unwrap();
        reader.align_byte();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_bits(8).unwrap(), 0x5A);
        assert!(reader.skip_bits(1).is_err());
        assert!(BitReader::new(&data).read_bits(33).is_err());
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 33) as usize;
        let mut reader = BitReader::new(&data);
        match reader.read_bits(n as u32) {
            Ok(value) => {
                let expected = (0..n).fold(0u64, |acc, i| {
                    (acc << 1) | ((data[i / 8] >> (7 - i % 8)) & 1) as u64
                });
                value as u64 == expected
            }
            Err(_) => n > data.len() * 8,
        }
    }

    #[quickcheck]
    fn prop_golomb_round_trip(values: Vec<u16>) -> bool {
        let values: Vec<u32> = values.into_iter().map(u32::from).collect();
        let encoded = encode_golomb(&values);
        let mut reader = BitReader::new(&encoded);
        values.iter().all(|&v| reader.read_golomb().ok() == Some(v))
    }
}
