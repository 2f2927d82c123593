//! WAV decoding for replaying recorded audio through the gate

use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read a WAV file and downmix it to mono `f32` samples in `[-1, 1]`
///
/// # Errors
///
/// Returns error if the file cannot be opened or decoded
pub fn read_wav_file(path: &Path) -> Result<DecodedAudio> {
    let reader = hound::WavReader::open(path)?;
    decode(reader)
}

/// Decode WAV bytes from any reader
///
/// # Errors
///
/// Returns error if the stream is not a supported WAV
pub fn read_wav<R: Read>(source: R) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(source)?;
    decode(reader)
}

#[allow(clippy::cast_precision_loss)]
fn decode<R: Read>(reader: hound::WavReader<R>) -> Result<DecodedAudio> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(Error::Audio(format!(
                    "unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect()
    };

    tracing::debug!(
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        channels,
        "decoded wav"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Encode mono `f32` samples as 16-bit PCM WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn pcm16_decodes_to_unit_range() {
        let bytes = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], 16000).unwrap();
        let decoded = read_wav(Cursor::new(bytes)).unwrap();

        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), 4);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.2f32, 0.4, -0.2, -0.4] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = read_wav(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 0.3).abs() < 1e-6);
        assert!((decoded.samples[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(read_wav(Cursor::new(b"not a wav".to_vec())).is_err());
    }
}
