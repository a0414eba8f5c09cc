//! WAV encoding of generated speech.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Encode mono `samples` as an in-memory 16-bit PCM WAV file.
///
/// 16-bit PCM rather than 32-bit float: it is the format every downstream
/// player decodes without surprises.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for &s in samples {
            // f32 [-1.0, 1.0] → i16 [-32768, 32767]
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(s16)?;
        }
        writer.finalize()?;
    }
    Ok(buffer.into_inner())
}
