//! AIFF sample files
//!
//! Mono integer AIFF (and uncompressed AIFC) read and write, with markers
//! and the MIDI note from the instrument chunk. Multichannel sounds go
//! through [`SampleLoader`](crate::SampleLoader) instead.

use crate::chunks::{
    self, AiffChunks, CommonChunk, InstrumentChunk, AIFF_TYPE, COMMON_ID,
    INSTRUMENT_ID, MARKER_ID, SOUND_DATA_ID,
};
use crate::error::{FileError, Result};
use rbe_audio::Synthesizer;
use rbe_model::{Marker, Partial};
use std::fs;
use std::path::Path;

/// A mono sound with markers, held in memory as `f64` samples
#[derive(Debug, Clone, PartialEq)]
pub struct AiffFile {
    samples: Vec<f64>,
    sample_rate: f64,
    midi_note: f64,
    markers: Vec<Marker>,
}

impl AiffFile {
    pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
    pub const DEFAULT_MIDI_NOTE: f64 = 60.0;
    pub const DEFAULT_BITS: u16 = 16;

    /// Wrap existing samples
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(FileError::InvalidArgument(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            midi_note: Self::DEFAULT_MIDI_NOTE,
            markers: Vec::new(),
        })
    }

    /// Render partials into a new file
    pub fn from_partials(partials: &[Partial], sample_rate: f64, fade_time: f64) -> Result<Self> {
        let mut file = Self::new(Vec::new(), sample_rate)?;
        file.add_partials(partials, fade_time)?;
        Ok(file)
    }

    /// Read a file from disk
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Parse a file held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let chunks = AiffChunks::parse(bytes)?;
        let common = chunks
            .common
            .ok_or_else(|| FileError::Format("missing COMM chunk".into()))?;
        if common.channels != 1 {
            return Err(FileError::Format(format!(
                "only mono AIFF files are supported, found {} channels",
                common.channels
            )));
        }
        let sound = chunks
            .sound_data
            .as_deref()
            .ok_or_else(|| FileError::Format("missing SSND chunk".into()))?;

        let mut samples = chunks::decode_samples(sound, common.bits_per_sample)?;
        let frames = common.sample_frames as usize;
        if samples.len() != frames {
            tracing::warn!(found = samples.len(), expected = frames, "AIFF sample count mismatch");
        }
        samples.truncate(frames);

        let mut file = Self::new(samples, common.sample_rate)?;
        if let Some(inst) = chunks.instrument {
            file.midi_note = inst.midi_note();
        }
        file.markers = chunks
            .markers
            .iter()
            .map(|m| Marker::new(f64::from(m.position) / common.sample_rate, m.name.clone()))
            .collect();
        tracing::debug!(
            frames,
            bits = common.bits_per_sample,
            sample_rate = common.sample_rate,
            "read AIFF"
        );
        Ok(file)
    }

    /// Write to disk with the given sample size (8, 16, 24 or 32 bits)
    pub fn write(&self, path: impl AsRef<Path>, bits: u16) -> Result<()> {
        let bytes = self.to_bytes(bits)?;
        fs::write(path.as_ref(), bytes)?;
        tracing::info!(path = %path.as_ref().display(), samples = self.samples.len(), "wrote AIFF");
        Ok(())
    }

    /// Encode as a complete AIFF file
    pub fn to_bytes(&self, bits: u16) -> Result<Vec<u8>> {
        let sound = chunks::encode_samples(&self.samples, bits)?;
        let mut body = Vec::new();

        let mut data = Vec::new();
        CommonChunk {
            channels: 1,
            sample_frames: self.samples.len() as u32,
            bits_per_sample: bits,
            sample_rate: self.sample_rate,
        }
        .write(&mut data)?;
        chunks::write_chunk(&mut body, COMMON_ID, &data)?;

        if !self.markers.is_empty() {
            let entries = chunks::marker_entries(&self.markers, |m| {
                (m.time.max(0.0) * self.sample_rate).round() as u32
            })?;
            data.clear();
            chunks::write_markers(&mut data, &entries)?;
            chunks::write_chunk(&mut body, MARKER_ID, &data)?;
        }

        data.clear();
        InstrumentChunk::from_midi_note(self.midi_note).write(&mut data)?;
        chunks::write_chunk(&mut body, INSTRUMENT_ID, &data)?;

        chunks::write_chunk(&mut body, SOUND_DATA_ID, &chunks::sound_data(&sound)?)?;
        Ok(chunks::write_form(AIFF_TYPE, &body)?)
    }

    /// Synthesize one partial into the sample buffer, growing it as needed
    pub fn add_partial(&mut self, partial: &Partial, fade_time: f64) -> Result<()> {
        let mut synth = Synthesizer::with_fade_time(self.sample_rate, fade_time)?;
        synth.synthesize(partial, &mut self.samples);
        Ok(())
    }

    /// Synthesize several partials into the sample buffer
    pub fn add_partials(&mut self, partials: &[Partial], fade_time: f64) -> Result<()> {
        let mut synth = Synthesizer::with_fade_time(self.sample_rate, fade_time)?;
        for partial in partials {
            synth.synthesize(partial, &mut self.samples);
        }
        Ok(())
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut Vec<f64> {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    pub fn midi_note(&self) -> f64 {
        self.midi_note
    }

    pub fn set_midi_note(&mut self, note: f64) {
        self.midi_note = note;
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }
}

/// Render partials and write them to an AIFF file
pub fn export_aiff(
    path: impl AsRef<Path>,
    partials: &[Partial],
    sample_rate: f64,
    bits: u16,
) -> Result<()> {
    AiffFile::from_partials(partials, sample_rate, Synthesizer::DEFAULT_FADE_TIME)?.write(path, bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::Breakpoint;

    fn tone(len: usize) -> Vec<f64> {
        (0..len).map(|i| 0.5 * (i as f64 * 0.05).sin()).collect()
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(AiffFile::new(Vec::new(), 0.0).is_err());
        assert!(AiffFile::new(Vec::new(), f64::NAN).is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut file = AiffFile::new(tone(1000), 22050.0).unwrap();
        file.set_midi_note(57.25);
        file.markers_mut().push(Marker::new(0.01, "attack"));
        file.markers_mut().push(Marker::new(0.04, "release"));

        let bytes = file.to_bytes(24).unwrap();
        assert_eq!(&bytes[..4], b"FORM");
        assert_eq!(&bytes[8..12], b"AIFF");

        let back = AiffFile::from_bytes(&bytes).unwrap();
        assert_eq!(back.sample_rate(), 22050.0);
        assert_eq!(back.samples().len(), 1000);
        assert!((back.midi_note() - 57.25).abs() < 1e-9);
        for (a, b) in file.samples().iter().zip(back.samples()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(back.markers().len(), 2);
        assert_eq!(back.markers()[1].name, "release");
        assert!((back.markers()[0].time - 0.01).abs() < 1.0 / 22050.0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.aiff");
        let file = AiffFile::new(tone(500), 44100.0).unwrap();
        file.write(&path, 16).unwrap();

        let back = AiffFile::read(&path).unwrap();
        assert_eq!(back.samples().len(), 500);
        assert!((back.duration() - 500.0 / 44100.0).abs() < 1e-12);
        assert_eq!(back.midi_note(), AiffFile::DEFAULT_MIDI_NOTE);
    }

    #[test]
    fn test_from_partials_renders_audio() {
        let mut partial = Partial::new();
        partial.insert(0.0, Breakpoint::new(440.0, 0.3, 0.0, 0.0));
        partial.insert(0.1, Breakpoint::new(440.0, 0.3, 0.0, 0.0));
        let file = AiffFile::from_partials(&[partial], 44100.0, 0.001).unwrap();
        assert!(file.duration() >= 0.1);
        let peak = file.samples().iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(peak > 0.2 && peak < 0.35);
    }

    #[test]
    fn test_rejects_stereo() {
        let mut sound = Vec::new();
        for v in [16384i16, -16384, 8192, 8192] {
            sound.extend_from_slice(&v.to_be_bytes());
        }
        let mut body = Vec::new();
        let mut comm = Vec::new();
        CommonChunk {
            channels: 2,
            sample_frames: 2,
            bits_per_sample: 16,
            sample_rate: 8000.0,
        }
        .write(&mut comm)
        .unwrap();
        chunks::write_chunk(&mut body, COMMON_ID, &comm).unwrap();
        chunks::write_chunk(&mut body, SOUND_DATA_ID, &chunks::sound_data(&sound).unwrap())
            .unwrap();
        let bytes = chunks::write_form(AIFF_TYPE, &body).unwrap();

        assert!(matches!(
            AiffFile::from_bytes(&bytes),
            Err(FileError::Format(_))
        ));
    }
}
