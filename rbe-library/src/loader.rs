//! Sound file loading and decoding
//!
//! Everything symphonia can probe (WAV, FLAC, MP3, OGG, AAC) goes through
//! its decoders; AIFF is read with the crate's own chunk parser. Sounds are
//! mixed down to mono `f64` samples for analysis.

use crate::chunks::{self, AiffChunks};
use crate::error::{FileError, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;

/// A decoded mono sound
#[derive(Debug, Clone, Default)]
pub struct LoadedSound {
    /// Mono samples, normalized to -1.0..1.0
    pub samples: Vec<f64>,
    /// Sample rate in Hz, after any resampling
    pub sample_rate: u32,
    /// Channel count of the source file
    pub source_channels: u16,
    /// Title tag, or the file stem
    pub title: String,
}

impl LoadedSound {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Sound file loader using Symphonia
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleLoader {
    target_sample_rate: Option<u32>,
}

impl SampleLoader {
    /// A loader that keeps each file's own sample rate
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that resamples everything to `target_sample_rate`
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate: Some(target_sample_rate),
        }
    }

    /// Load, decode and mix down a sound file
    pub fn load(&self, path: &Path) -> Result<LoadedSound> {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();
        let is_aiff = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "aif" | "aiff" | "aifc"));

        let (interleaved, source_rate, channels, title) = if is_aiff {
            let (samples, rate, channels) = decode_aiff(&std::fs::read(path)?)?;
            (samples, rate, channels, title)
        } else {
            decode_with_symphonia(path, title)?
        };

        let mono = mix_down(&interleaved, channels);
        let (samples, sample_rate) = match self.target_sample_rate {
            Some(target) if target != source_rate => (resample(&mono, source_rate, target)?, target),
            _ => (mono, source_rate),
        };
        tracing::debug!(
            path = %path.display(),
            channels,
            source_rate,
            sample_rate,
            samples = samples.len(),
            "loaded sound"
        );

        Ok(LoadedSound {
            samples,
            sample_rate,
            source_channels: channels,
            title,
        })
    }
}

/// Interleaved samples, sample rate and channel count of an AIFF file
fn decode_aiff(bytes: &[u8]) -> Result<(Vec<f64>, u32, u16)> {
    let chunks = AiffChunks::parse(bytes)?;
    let common = chunks
        .common
        .ok_or_else(|| FileError::Format("missing COMM chunk".into()))?;
    let sound = chunks
        .sound_data
        .as_deref()
        .ok_or_else(|| FileError::Format("missing SSND chunk".into()))?;
    let mut samples = chunks::decode_samples(sound, common.bits_per_sample)?;
    samples.truncate(common.sample_frames as usize * usize::from(common.channels));
    Ok((samples, common.sample_rate.round() as u32, common.channels))
}

fn decode_with_symphonia(path: &Path, fallback_title: String) -> Result<(Vec<f64>, u32, u16, String)> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| FileError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FileError::Decode("no audio track found".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| FileError::Decode("unknown sample rate".into()))?;
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| FileError::Decode(e.to_string()))?;

    let mut title = fallback_title;
    if let Some(meta) = format.metadata().current() {
        if let Some(tag) = meta
            .tags()
            .iter()
            .find(|t| t.std_key == Some(StandardTagKey::TrackTitle))
        {
            title = tag.value.to_string();
        }
    }

    let mut samples: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stopped reading packets");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(sample_buf.samples().iter().map(|&s| f64::from(s)));
    }

    if channels == 0 {
        return Err(FileError::Decode("no channels decoded".into()));
    }
    Ok((samples, source_rate, channels, title))
}

/// Average interleaved channels into one
fn mix_down(interleaved: &[f64], channels: u16) -> Vec<f64> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect()
}

/// Resample a mono signal with rubato's fixed-ratio FFT resampler
fn resample(samples: &[f64], source_rate: u32, target_rate: u32) -> Result<Vec<f64>> {
    use rubato::{FftFixedInOut, Resampler};

    let mut resampler =
        FftFixedInOut::<f64>::new(source_rate as usize, target_rate as usize, 1024, 1)
            .map_err(|e| FileError::Decode(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let mut output = Vec::with_capacity(
        samples.len() * target_rate as usize / source_rate.max(1) as usize + chunk_size,
    );

    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let resampled = resampler
            .process(&[&samples[pos..pos + chunk_size]], None)
            .map_err(|e| FileError::Decode(e.to_string()))?;
        output.extend_from_slice(&resampled[0]);
        pos += chunk_size;
    }

    // pad the tail with silence and keep the proportional share of the output
    if pos < samples.len() {
        let remaining = samples.len() - pos;
        let mut tail = samples[pos..].to_vec();
        tail.resize(chunk_size, 0.0);
        let resampled = resampler
            .process(&[tail.as_slice()], None)
            .map_err(|e| FileError::Decode(e.to_string()))?;
        let keep = remaining * target_rate as usize / source_rate as usize;
        output.extend_from_slice(&resampled[0][..keep.min(resampled[0].len())]);
    }

    Ok(output)
}
