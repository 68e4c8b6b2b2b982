//! SNAC frame codec: 7-token frames ↔ three hierarchical code streams.
//!
//! ```text
//! slot:    0    1    2    3    4    5    6
//! stream:  L1   L2   L3   L3   L2   L3   L3
//! ```

use crate::config::{CodeSpace, ControlTokens, TOKENS_PER_FRAME};
use crate::{Error, Result};

/// The three SNAC code levels, coarse to fine. Values are codec symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeStreams {
    pub l1: Vec<u32>,
    pub l2: Vec<u32>,
    pub l3: Vec<u32>,
}

impl CodeStreams {
    /// Number of frames (L1 length).
    pub fn frames(&self) -> usize {
        self.l1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l1.is_empty() && self.l2.is_empty() && self.l3.is_empty()
    }

    /// Check the 1:2:4 length ratio and that every symbol fits the codebook.
    pub fn validate(&self, codebook_size: u32) -> Result<()> {
        let frames = self.l1.len();
        if self.l2.len() != 2 * frames || self.l3.len() != 4 * frames {
            return Err(Error::Codec(format!(
                "code stream lengths {}/{}/{} violate the 1:2:4 ratio",
                self.l1.len(),
                self.l2.len(),
                self.l3.len()
            )));
        }
        let levels = [&self.l1, &self.l2, &self.l3];
        for (level, stream) in levels.iter().enumerate() {
            if let Some(bad) = stream.iter().find(|&&s| s >= codebook_size) {
                return Err(Error::Codec(format!(
                    "symbol {bad} in L{} exceeds codebook size {codebook_size}",
                    level + 1
                )));
            }
        }
        Ok(())
    }
}

/// De-interleave audio-code tokens into [`CodeStreams`].
///
/// A trailing `code_end` is stripped. Tokens beyond the last complete frame
/// are dropped. Fewer than 7 tokens yields empty streams.
pub fn unpack_frames(codes: &[u32], control: &ControlTokens, space: &CodeSpace) -> CodeStreams {
    let codes = match codes.split_last() {
        Some((&last, rest)) if last == control.code_end => rest,
        _ => codes,
    };

    let frames = codes.len() / TOKENS_PER_FRAME;
    let mut streams = CodeStreams {
        l1: Vec::with_capacity(frames),
        l2: Vec::with_capacity(2 * frames),
        l3: Vec::with_capacity(4 * frames),
    };

    for slots in codes.chunks_exact(TOKENS_PER_FRAME) {
        let s = |i: usize| space.symbol(slots[i]);
        streams.l1.push(s(0));
        streams.l2.extend([s(1), s(4)]);
        streams.l3.extend([s(2), s(3), s(5), s(6)]);
    }

    streams
}

/// Re-interleave code streams into audio-code tokens.
///
/// Inverse of [`unpack_frames`] for streams that pass [`CodeStreams::validate`].
pub fn pack_frames(streams: &CodeStreams, space: &CodeSpace) -> Result<Vec<u32>> {
    streams.validate(space.codebook_size)?;

    let mut codes = Vec::with_capacity(streams.frames() * TOKENS_PER_FRAME);
    for i in 0..streams.frames() {
        let (l2, l3) = (&streams.l2[2 * i..2 * i + 2], &streams.l3[4 * i..4 * i + 4]);
        let frame = [streams.l1[i], l2[0], l3[0], l3[1], l2[1], l3[2], l3[3]];
        codes.extend(frame.iter().map(|&symbol| space.token(symbol)));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpack(codes: &[u32]) -> CodeStreams {
        unpack_frames(codes, &ControlTokens::default(), &CodeSpace::default())
    }

    /// Deterministic pseudo-random in-range code tokens.
    fn synthetic_codes(n: usize) -> Vec<u32> {
        let space = CodeSpace::default();
        let span = space.max_code - space.min_code + 1;
        let mut state = 0x2545_f491u32;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                space.min_code + (state >> 8) % span
            })
            .collect()
    }

    #[test]
    fn test_single_frame_slot_mapping() {
        let codes: Vec<u32> = (4..=10).map(|s| 128266 + s).collect();
        let streams = unpack(&codes);
        assert_eq!(streams.l1, vec![4]);
        assert_eq!(streams.l2, vec![5, 8]);
        assert_eq!(streams.l3, vec![6, 7, 9, 10]);
    }

    #[test]
    fn test_length_ratios_and_symbol_range() {
        for k in 0..6 {
            let streams = unpack(&synthetic_codes(7 * k));
            assert_eq!(streams.l1.len(), k);
            assert_eq!(streams.l2.len(), 2 * k);
            assert_eq!(streams.l3.len(), 4 * k);
            let all = streams.l1.iter().chain(&streams.l2).chain(&streams.l3);
            assert!(all.into_iter().all(|&s| s < 4096));
            streams.validate(4096).unwrap();
        }
    }

    #[test]
    fn test_remainder_is_dropped() {
        let codes = synthetic_codes(30);
        for len in 0..=codes.len() {
            let whole = len / 7 * 7;
            assert_eq!(unpack(&codes[..len]), unpack(&codes[..whole]), "len {len}");
        }
    }

    #[test]
    fn test_fewer_than_one_frame_is_empty() {
        let streams = unpack(&synthetic_codes(6));
        assert!(streams.is_empty());
        assert_eq!(streams.frames(), 0);
        assert!(unpack(&[]).is_empty());
    }

    #[test]
    fn test_trailing_end_marker_is_stripped() {
        let mut codes = synthetic_codes(14);
        let expected = unpack(&codes);
        codes.push(128258);
        assert_eq!(unpack(&codes), expected);

        // A marker-only input is just empty.
        assert!(unpack(&[128258]).is_empty());
    }

    #[test]
    fn test_symbols_wrap_modulo_codebook() {
        let base = 128266 + 4096;
        let codes: Vec<u32> = (0..7).map(|s| base + s).collect();
        let streams = unpack(&codes);
        assert_eq!(streams.l1, vec![0]);
        assert_eq!(streams.l2, vec![1, 4]);
        assert_eq!(streams.l3, vec![2, 3, 5, 6]);
    }

    #[test]
    fn test_all_zero_round_trip() {
        let space = CodeSpace::default();
        let zeros = CodeStreams {
            l1: vec![0; 3],
            l2: vec![0; 6],
            l3: vec![0; 12],
        };
        let codes = pack_frames(&zeros, &space).unwrap();
        assert_eq!(codes, vec![128266; 21]);
        assert_eq!(unpack(&codes), zeros);
    }

    #[test]
    fn test_pack_inverts_unpack_for_canonical_codes() {
        let space = CodeSpace::default();
        let codes: Vec<u32> = (0..35u32).map(|i| space.token((i * 97) % 4096)).collect();
        let streams = unpack(&codes);
        assert_eq!(pack_frames(&streams, &space).unwrap(), codes);
    }

    #[test]
    fn test_pack_rejects_bad_ratio_and_symbols() {
        let space = CodeSpace::default();
        let bad_ratio = CodeStreams {
            l1: vec![0],
            l2: vec![0],
            l3: vec![0; 4],
        };
        assert!(matches!(pack_frames(&bad_ratio, &space), Err(Error::Codec(_))));

        let bad_symbol = CodeStreams {
            l1: vec![4096],
            l2: vec![0; 2],
            l3: vec![0; 4],
        };
        let err = pack_frames(&bad_symbol, &space).unwrap_err();
        assert!(err.to_string().contains("L1"));
    }
}
