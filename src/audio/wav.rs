//! In-memory WAV encoding (mono, 16-bit PCM).

use std::io::Cursor;

use crate::Result;

/// Encode mono f32 samples as a 16-bit PCM WAV byte buffer.
///
/// Samples are clamped to [-1, 1] before quantization.
pub fn write_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &s in samples {
        let clamped = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
    }
    writer.finalize()?;
    Ok(bytes)
}

/// Decode a WAV byte buffer, return (samples, sample_rate, num_channels).
///
/// Samples are interleaved f32 in [-1, 1].
pub fn read_wav_bytes(bytes: &[u8]) -> Result<(Vec<f32>, u32, u16)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_size() {
        let bytes = write_wav_bytes(&[0.0; 100], 24000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 200);
    }

    #[test]
    fn test_roundtrip_wav_bytes() {
        let original = vec![0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        let bytes = write_wav_bytes(&original, 24000).unwrap();
        let (loaded, sr, ch) = read_wav_bytes(&bytes).unwrap();
        assert_eq!(sr, 24000);
        assert_eq!(ch, 1);
        assert_eq!(loaded.len(), original.len());
        for (a, b) in loaded.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let bytes = write_wav_bytes(&[2.0, -3.0, f32::NAN], 24000).unwrap();
        let (loaded, _, _) = read_wav_bytes(&bytes).unwrap();
        assert!((loaded[0] - 1.0).abs() < 1e-3);
        assert!((loaded[1] + 1.0).abs() < 1e-3);
        assert_eq!(loaded[2], 0.0);
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(read_wav_bytes(b"not a wav file").is_err());
    }

    #[test]
    fn test_bytes_are_a_playable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        let bytes = write_wav_bytes(&[0.1; 480], 24000).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration(), 480);
    }
}
