//! Kyma spectral envelope (SPC) files
//!
//! An SPC file is a 24-bit mono AIFF whose "samples" are log-packed
//! envelope frames, one word (sine-only) or two words (bandwidth-enhanced)
//! per harmonic per frame, described by a `SOSe` application chunk.
//!
//! Left word: 7 bits of log sine magnitude over 16 bits of log frequency.
//! Right word: 7 bits of log noise magnitude over 16 bits of phase.

use crate::chunks::{
    self, AiffChunks, CommonChunk, InstrumentChunk, AIFF_TYPE, APPLICATION_ID,
    COMMON_ID, INSTRUMENT_ID, MARKER_ID, SOUND_DATA_ID,
};
use crate::error::{FileError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rbe_model::{wrap_phase, Breakpoint, Marker, Partial};
use std::f64::consts::PI;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

const SOS_SIGNATURE: &[u8; 4] = b"SOSe";
/// Length of the legacy per-partial table in the `SOSe` chunk
const SOS_TABLE_LEN: usize = 2 * SpcFile::LARGEST_LABEL as usize + 8;
const FADE_TIME: f64 = 0.001;
const NYQUIST_44K: f64 = 22050.0;
/// 65535 / ln(32768)
const LOG_COEFF: f64 = 65535.0 / (15.0 * std::f64::consts::LN_2);

/// Map [0, 1] onto the 16-bit log scale
fn env_log(value: f64) -> u32 {
    (LOG_COEFF * (32768.0 * value.clamp(0.0, 1.0) + 1.0).ln()) as u32
}

/// Inverse of [`env_log`]
fn env_exp(code: u32) -> f64 {
    ((f64::from(code) / LOG_COEFF).exp() - 1.0) / 32768.0
}

/// Number of envelope slots stored in a file: the next power of two from 32
fn file_partials(num_partials: usize) -> usize {
    num_partials.max(SpcFile::MIN_NUM_PARTIALS).next_power_of_two()
}

/// Envelope parameter streams for Kyma, indexed by harmonic label
#[derive(Debug, Clone, PartialEq)]
pub struct SpcFile {
    /// Slot `i` holds the partial labeled `i + 1`
    partials: Vec<Partial>,
    markers: Vec<Marker>,
    midi_note: f64,
    sample_rate: f64,
}

impl Default for SpcFile {
    fn default() -> Self {
        let mut file = Self {
            partials: Vec::new(),
            markers: Vec::new(),
            midi_note: Self::DEFAULT_MIDI_NOTE,
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
        };
        file.grow(Self::MIN_NUM_PARTIALS);
        file
    }
}

impl SpcFile {
    pub const LARGEST_LABEL: i32 = 512;
    pub const MIN_NUM_PARTIALS: usize = 32;
    pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
    pub const DEFAULT_MIDI_NOTE: f64 = 60.0;

    /// An empty file with the given fractional MIDI note number
    pub fn new(midi_note: f64) -> Result<Self> {
        let mut file = Self::default();
        file.set_midi_note(midi_note)?;
        Ok(file)
    }

    /// A file holding every labeled partial in `partials`
    pub fn from_partials(partials: &[Partial], midi_note: f64) -> Result<Self> {
        let mut file = Self::new(midi_note)?;
        for partial in partials {
            file.add_partial(partial)?;
        }
        Ok(file)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Add a partial at the slot given by its own label
    pub fn add_partial(&mut self, partial: &Partial) -> Result<()> {
        if partial.label() == 0 {
            return Err(FileError::InvalidArgument(
                "SPC partials must be labeled".into(),
            ));
        }
        self.add_partial_with_label(partial, partial.label())
    }

    /// Add a partial at the slot for `label`, replacing whatever was there
    pub fn add_partial_with_label(&mut self, partial: &Partial, label: i32) -> Result<()> {
        if label < 1 {
            return Err(FileError::InvalidArgument(format!(
                "SPC partials must have positive labels, got {label}"
            )));
        }
        if label > Self::LARGEST_LABEL {
            return Err(FileError::InvalidArgument(format!(
                "SPC label {label} exceeds {}",
                Self::LARGEST_LABEL
            )));
        }
        let slot = label as usize - 1;
        self.grow(slot + 1);
        self.partials[slot] = partial.clone();
        self.partials[slot].set_label(label);
        Ok(())
    }

    fn grow(&mut self, size: usize) {
        if self.partials.len() >= size {
            return;
        }
        let size = file_partials(size);
        let start = self.partials.len();
        self.partials
            .extend((start..size).map(|slot| Partial::with_label(slot as i32 + 1)));
    }

    /// One partial per slot, labeled by position. Unused slots are empty.
    pub fn partials(&self) -> &[Partial] {
        &self.partials
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }

    pub fn midi_note(&self) -> f64 {
        self.midi_note
    }

    pub fn set_midi_note(&mut self, note: f64) -> Result<()> {
        if !(0.0..=128.0).contains(&note) {
            return Err(FileError::InvalidArgument(format!(
                "MIDI note {note} outside [0, 128]"
            )));
        }
        self.midi_note = note;
        Ok(())
    }

    /// Rate at which Kyma must run to play the envelopes back at pitch
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, rate: f64) -> Result<()> {
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(FileError::InvalidArgument(format!(
                "sample rate must be positive, got {rate}"
            )));
        }
        self.sample_rate = rate;
        Ok(())
    }

    /// Export envelope streams to `path`.
    ///
    /// `enhanced` writes bandwidth and phase as well as sine magnitude and
    /// frequency. A nonzero `end_approach_time` blends every envelope toward
    /// its final value over that many seconds before the end, for sounds
    /// that sustain on their last frame.
    pub fn write(&self, path: impl AsRef<Path>, enhanced: bool, end_approach_time: f64) -> Result<()> {
        let bytes = self.to_bytes(enhanced, end_approach_time)?;
        fs::write(path.as_ref(), &bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            bytes = bytes.len(),
            enhanced,
            "wrote SPC"
        );
        Ok(())
    }

    pub fn to_bytes(&self, enhanced: bool, end_approach_time: f64) -> Result<Vec<u8>> {
        if end_approach_time < 0.0 || !end_approach_time.is_finite() {
            return Err(FileError::InvalidArgument(format!(
                "end approach time may not be negative, got {end_approach_time}"
            )));
        }
        let export = Export::new(&self.partials, self.sample_rate, enhanced, end_approach_time)?;
        let words = export.words_per_frame();
        let envelopes = export.pack_envelopes()?;
        let mut body = Vec::new();

        let mut data = Vec::new();
        CommonChunk {
            channels: 1,
            sample_frames: (export.frames * words) as u32,
            bits_per_sample: 24,
            sample_rate: self.sample_rate,
        }
        .write(&mut data)?;
        chunks::write_chunk(&mut body, COMMON_ID, &data)?;

        if !self.markers.is_empty() {
            // markers snap to the frame before them
            let entries = chunks::marker_entries(&self.markers, |m| {
                ((m.time.max(0.0) / export.hop) as usize * words) as u32
            })?;
            data.clear();
            chunks::write_markers(&mut data, &entries)?;
            chunks::write_chunk(&mut body, MARKER_ID, &data)?;
        }

        data.clear();
        InstrumentChunk::from_midi_note(self.midi_note).write(&mut data)?;
        chunks::write_chunk(&mut body, INSTRUMENT_ID, &data)?;

        data.clear();
        export.write_sos_chunk(&mut data)?;
        chunks::write_chunk(&mut body, APPLICATION_ID, &data)?;

        chunks::write_chunk(&mut body, SOUND_DATA_ID, &chunks::sound_data(&envelopes)?)?;
        Ok(chunks::write_form(AIFF_TYPE, &body)?)
    }

    /// Decode an SPC file held in memory. Frame `k` lands at time `k * hop`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let chunks = AiffChunks::parse(bytes)?;
        let common = chunks
            .common
            .ok_or_else(|| FileError::Format("missing COMM chunk".into()))?;
        let sound = chunks
            .sound_data
            .as_deref()
            .ok_or_else(|| FileError::Format("missing SSND chunk".into()))?;
        let sos = chunks
            .application(SOS_SIGNATURE)
            .ok_or_else(|| FileError::Format("no SOSe chunk, not an SPC file".into()))?;

        let mut r = Cursor::new(sos);
        let enhanced = r.read_u32::<BigEndian>()? != 0;
        let valid_partials = r.read_u32::<BigEndian>()? as usize;
        let mut table = Vec::new();
        while let Ok(v) = r.read_i32::<BigEndian>() {
            table.push(v);
        }
        let per_partial = if enhanced { 2 } else { 1 };
        let num_partials = valid_partials / per_partial;
        if common.bits_per_sample != 24 || num_partials == 0 {
            return Err(FileError::Format("not an SPC file".into()));
        }
        if !(Self::MIN_NUM_PARTIALS..=Self::LARGEST_LABEL as usize).contains(&num_partials) {
            return Err(FileError::Format(format!(
                "bad number of partials {num_partials} in SPC file"
            )));
        }
        let resolution = table.get(valid_partials).copied().ok_or_else(|| {
            FileError::Format("SOSe chunk too short for its partial count".into())
        })?;
        let hop = f64::from(resolution) * 1e-6;
        if hop <= 0.0 {
            return Err(FileError::Format(format!("bad SPC frame resolution {resolution}")));
        }

        let slots = file_partials(num_partials);
        let words = slots * per_partial;
        let mut file = Self::default();
        file.sample_rate = common.sample_rate;
        if let Some(inst) = chunks.instrument {
            file.midi_note = inst.midi_note();
        }
        file.grow(num_partials);
        file.markers = chunks
            .markers
            .iter()
            .map(|m| Marker::new(f64::from(m.position) * hop / words as f64, m.name.clone()))
            .collect();

        let frame_bytes = words * 3;
        let frames = (common.sample_frames as usize / words).min(sound.len() / frame_bytes);
        for (frame, data) in sound.chunks_exact(frame_bytes).take(frames).enumerate() {
            let time = frame as f64 * hop;
            let mut r = Cursor::new(data);
            for slot in 0..slots {
                let left = r.read_u24::<BigEndian>()?;
                let bp = if enhanced {
                    let right = r.read_u24::<BigEndian>()?;
                    unpack_enhanced(left, right, hop)
                } else {
                    unpack_sine(left)
                };
                if let Some(partial) = file.partials.get_mut(slot) {
                    partial.insert(time, bp);
                }
            }
        }
        tracing::debug!(frames, num_partials, enhanced, hop, "read SPC");
        Ok(file)
    }
}

/// Write labeled partials to an SPC file
pub fn export_spc(
    path: impl AsRef<Path>,
    partials: &[Partial],
    midi_note: f64,
    enhanced: bool,
    end_approach_time: f64,
) -> Result<()> {
    SpcFile::from_partials(partials, midi_note)?.write(path, enhanced, end_approach_time)
}

/// Read the non-empty partials of an SPC file
pub fn import_spc(path: impl AsRef<Path>) -> Result<Vec<Partial>> {
    Ok(SpcFile::read(path)?
        .partials
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect())
}

fn unpack_sine(left: u32) -> Breakpoint {
    let frequency = env_exp(left & 0xFFFF) * NYQUIST_44K;
    let amplitude = env_exp((left >> 7) & 0xFE00);
    Breakpoint::new(frequency, amplitude, 0.0, 0.0)
}

fn unpack_enhanced(left: u32, right: u32, hop: f64) -> Breakpoint {
    let frequency = env_exp(left & 0xFFFF) * NYQUIST_44K;
    let sine = env_exp((left >> 7) & 0xFE00);
    let noise = env_exp((right >> 7) & 0xFE00) / 64.0;
    let total = sine * sine + noise * noise;
    let bandwidth = if total > 0.0 {
        (noise * noise / total).min(1.0)
    } else {
        0.0
    };
    // undo the one-hop phase advance applied when packing
    let stored = f64::from(right & 0xFFFF) * (2.0 * PI / 65535.0);
    let phase = wrap_phase(stored - PI / 2.0 + 2.0 * PI * hop * frequency);
    Breakpoint::new(frequency, total.sqrt(), bandwidth, phase)
}

/// Frame layout and timing for one export
struct Export<'a> {
    slots: &'a [Partial],
    reference: &'a Partial,
    reference_label: i32,
    enhanced: bool,
    end_approach: f64,
    start: f64,
    end: f64,
    hop: f64,
    frames: usize,
    amp_epsilon: f64,
}

impl<'a> Export<'a> {
    fn new(slots: &'a [Partial], sample_rate: f64, enhanced: bool, end_approach: f64) -> Result<Self> {
        let reference = slots
            .iter()
            .find(|p| !p.is_empty())
            .ok_or_else(|| FileError::InvalidArgument("no partials to export".into()))?;
        let (start, end) = slots
            .iter()
            .filter(|p| !p.is_empty() && p.label() > 0)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(s, e), p| {
                (s.min(p.start_time()), e.max(p.end_time()))
            });
        // each frame spans two samples per slot
        let hop = 2.0 * slots.len() as f64 / sample_rate;
        let frames = ((end - start) / hop) as usize + 1;
        tracing::debug!(start, end, hop, partials = slots.len(), frames, "configured SPC export");
        Ok(Self {
            slots,
            reference,
            reference_label: reference.label(),
            enhanced,
            end_approach,
            start,
            end,
            hop,
            frames,
            amp_epsilon: 2.0 * env_exp(0x200),
        })
    }

    fn words_per_frame(&self) -> usize {
        self.slots.len() * if self.enhanced { 2 } else { 1 }
    }

    fn pack_envelopes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.frames * self.words_per_frame() * 3);
        let mut phase_refs = vec![f64::NEG_INFINITY; self.slots.len()];

        for frame in 0..self.frames {
            let time = self.start + frame as f64 * self.hop;
            for (slot, partial) in self.slots.iter().enumerate() {
                let label = slot as i32 + 1;
                let (source, mag_mult, freq_mult) = if partial.is_empty() {
                    (
                        self.reference,
                        0.0,
                        f64::from(label) / f64::from(self.reference_label),
                    )
                } else {
                    (partial, 1.0, 1.0)
                };
                let phase_ref = self.phase_ref_time(source, time, &mut phase_refs[slot]);
                let bp = self.frame_values(source, time, phase_ref, mag_mult, freq_mult);
                let (left, right) = self.pack(&bp);
                bytes.write_u24::<BigEndian>(left)?;
                if self.enhanced {
                    bytes.write_u24::<BigEndian>(right)?;
                }
            }
        }
        Ok(bytes)
    }

    /// First frame time at or after `time` where the partial is audible.
    /// Frames are visited in time order, so the previous answer is reused
    /// until it has been passed.
    fn phase_ref_time(&self, partial: &Partial, mut time: f64, previous: &mut f64) -> f64 {
        if *previous > time && time > self.start {
            return *previous;
        }
        while partial.amplitude_at_faded(time, FADE_TIME) < self.amp_epsilon
            && time < self.end + self.hop
        {
            time += self.hop;
        }
        *previous = time;
        time
    }

    fn frame_values(
        &self,
        partial: &Partial,
        mut time: f64,
        phase_ref: f64,
        mag_mult: f64,
        freq_mult: f64,
    ) -> Breakpoint {
        if self.end_approach > 0.0 && time > self.end - self.end_approach {
            // blend toward the static spectrum at the end
            if time > partial.end_time() && partial.end_time() > self.end - 2.0 * self.hop {
                time = partial.end_time();
            }
            let wt = (self.end - time) / self.end_approach;
            let blend = |now: f64, last: f64| wt * now + (1.0 - wt) * last;
            Breakpoint::new(
                freq_mult * blend(partial.frequency_at(time), partial.frequency_at(self.end)),
                mag_mult
                    * blend(
                        partial.amplitude_at_faded(time, FADE_TIME),
                        partial.amplitude_at_faded(self.end, FADE_TIME),
                    ),
                blend(partial.bandwidth_at(time), partial.bandwidth_at(self.end)),
                partial.phase_at(time),
            )
        } else if time < phase_ref - self.hop / 2.0 || time > self.end - self.hop / 2.0 {
            // silent, with the phase run back from the onset
            let frequency = freq_mult * partial.frequency_at(phase_ref);
            let phase = partial.phase_at(phase_ref) - 2.0 * PI * (phase_ref - time) * frequency;
            Breakpoint::new(frequency, 0.0, 0.0, phase)
        } else {
            Breakpoint::new(
                freq_mult * partial.frequency_at(time),
                mag_mult * partial.amplitude_at_faded(time, FADE_TIME),
                partial.bandwidth_at(time),
                partial.phase_at(time),
            )
        }
    }

    /// Pack one breakpoint into left and right 24-bit words
    fn pack(&self, bp: &Breakpoint) -> (u32, u32) {
        // Kyma expects the phase one hop early and a quarter cycle ahead
        let phase = (bp.phase - 2.0 * PI * self.hop * bp.frequency + PI / 2.0).rem_euclid(2.0 * PI);
        let bandwidth = bp.bandwidth.clamp(0.0, 1.0);
        let sine = bp.amplitude * (1.0 - bandwidth).sqrt();
        let noise = (64.0 * bp.amplitude * bandwidth.sqrt()).min(1.0);

        let left = ((env_log(sine) & 0xFE00) << 7) | (env_log(bp.frequency / NYQUIST_44K) & 0xFFFF);
        let phase_code = ((phase / (2.0 * PI)) * 65535.0) as u32 & 0xFFFF;
        let right = ((env_log(noise) & 0xFE00) << 7) | phase_code;
        (left, right)
    }

    fn write_sos_chunk<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let valid = self.words_per_frame();
        writer.write_all(SOS_SIGNATURE)?;
        writer.write_u32::<BigEndian>(u32::from(self.enhanced))?;
        writer.write_u32::<BigEndian>(valid as u32)?;
        let mut table = [0i32; SOS_TABLE_LEN];
        // frame resolution in microseconds, then the quasi-harmonic count
        table[valid] = (1e6 * self.hop) as i32;
        table[valid + 1] = valid as i32;
        for v in table {
            writer.write_i32::<BigEndian>(v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(label: i32, freq: f64, amp: f64, bw: f64) -> Partial {
        let mut p = Partial::with_label(label);
        for k in 0..=10 {
            let t = k as f64 * 0.05;
            p.insert(t, Breakpoint::new(freq, amp, bw, wrap_phase(2.0 * PI * freq * t)));
        }
        p
    }

    #[test]
    fn test_env_log_inverse() {
        assert_eq!(env_log(0.0), 0);
        assert_eq!(env_log(1.0), 65535);
        for x in [0.001, 0.02, 0.3, 0.9] {
            let y = env_exp(env_log(x));
            assert!(y <= x && (x - y) / x < 1e-3, "x {x} y {y}");
        }
    }

    #[test]
    fn test_file_partials() {
        assert_eq!(file_partials(1), 32);
        assert_eq!(file_partials(32), 32);
        assert_eq!(file_partials(33), 64);
        assert_eq!(file_partials(300), 512);
    }

    #[test]
    fn test_add_partial_labels() {
        let mut file = SpcFile::new(60.0).unwrap();
        assert_eq!(file.partials().len(), 32);

        assert!(matches!(
            file.add_partial(&steady(0, 100.0, 0.1, 0.0)),
            Err(FileError::InvalidArgument(_))
        ));
        assert!(file.add_partial(&steady(513, 100.0, 0.1, 0.0)).is_err());
        assert!(file.add_partial_with_label(&steady(1, 100.0, 0.1, 0.0), 0).is_err());

        file.add_partial(&steady(40, 4000.0, 0.1, 0.0)).unwrap();
        assert_eq!(file.partials().len(), 64);
        assert_eq!(file.partials()[39].label(), 40);
        assert_eq!(file.partials()[63].label(), 64);

        file.add_partial_with_label(&steady(7, 300.0, 0.2, 0.0), 40).unwrap();
        assert_eq!(file.partials()[39].label(), 40);
        assert_eq!(file.partials()[39].frequency_at(0.1), 300.0);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(SpcFile::new(-1.0).is_err());
        let mut file = SpcFile::default();
        assert!(file.set_sample_rate(0.0).is_err());
        assert!(matches!(
            file.to_bytes(true, 0.0),
            Err(FileError::InvalidArgument(_))
        ));
        file.add_partial(&steady(1, 220.0, 0.3, 0.0)).unwrap();
        assert!(file.to_bytes(true, -0.1).is_err());
    }

    #[test]
    fn test_enhanced_round_trip() {
        let first = steady(1, 440.0, 0.5, 0.0);
        let second = steady(2, 880.0, 0.25, 0.0);
        let mut file = SpcFile::from_partials(&[first.clone(), second], 69.5).unwrap();
        file.markers_mut().push(Marker::new(0.1, "loop"));

        let back = SpcFile::from_bytes(&file.to_bytes(true, 0.0).unwrap()).unwrap();
        assert_eq!(back.partials().len(), 32);
        assert!((back.midi_note() - 69.5).abs() < 1e-9);
        assert_eq!(back.markers().len(), 1);
        assert_eq!(back.markers()[0].name, "loop");
        let hop = 64.0 / 44100.0;
        assert!((back.markers()[0].time - 0.1).abs() <= hop);

        let k = 172;
        let written = k as f64 * hop;
        let (t, bp) = back.partials()[0].get(k).copied().unwrap();
        // frame times come back at whole-microsecond resolution
        assert!((t - written).abs() < 1e-4);
        assert!((bp.frequency - 440.0).abs() < 0.5);
        assert!(bp.amplitude <= 0.5 && bp.amplitude > 0.45);
        assert!(wrap_phase(bp.phase - first.phase_at(written)).abs() < 5e-3);

        let (_, bp) = back.partials()[1].get(k).copied().unwrap();
        assert!((bp.frequency - 880.0).abs() < 1.0);
        assert!(bp.amplitude > 0.22);

        // missing harmonics follow the reference at zero amplitude
        let (_, bp) = back.partials()[2].get(k).copied().unwrap();
        assert!((bp.frequency - 1320.0).abs() < 1.0);
        assert_eq!(bp.amplitude, 0.0);
    }

    #[test]
    fn test_sine_only_layout() {
        let file = SpcFile::from_partials(&[steady(1, 440.0, 0.5, 0.3)], 60.0).unwrap();
        let bytes = file.to_bytes(false, 0.0).unwrap();
        let chunks = AiffChunks::parse(&bytes).unwrap();
        let common = chunks.common.unwrap();
        assert_eq!(common.bits_per_sample, 24);
        assert_eq!(chunks.sound_data.unwrap().len(), common.sample_frames as usize * 3);
        assert_eq!(common.sample_frames % 32, 0);

        let back = SpcFile::from_bytes(&bytes).unwrap();
        let (_, bp) = back.partials()[0].get(100).copied().unwrap();
        assert_eq!(bp.bandwidth, 0.0);
        assert_eq!(bp.phase, 0.0);
        // sine magnitude only: 0.5 * sqrt(0.7)
        assert!(bp.amplitude < 0.42 && bp.amplitude > 0.38);
    }

    #[test]
    fn test_end_approach_blends_toward_final_spectrum() {
        let mut p = Partial::with_label(1);
        p.insert(0.0, Breakpoint::new(300.0, 0.5, 0.0, 0.0));
        p.insert(0.5, Breakpoint::new(300.0, 0.1, 0.0, 0.0));
        let file = SpcFile::from_partials(&[p], 60.0).unwrap();
        let hop = 64.0 / 44100.0;
        let k = (0.4 / hop) as usize;

        let plain = SpcFile::from_bytes(&file.to_bytes(true, 0.0).unwrap()).unwrap();
        let approach = SpcFile::from_bytes(&file.to_bytes(true, 0.2).unwrap()).unwrap();
        let amp = |f: &SpcFile| f.partials()[0].get(k).map_or(0.0, |(_, bp)| bp.amplitude);
        assert!(amp(&plain) > 0.16);
        assert!(amp(&approach) < 0.16);
    }

    #[test]
    fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.spc");
        export_spc(&path, &[steady(1, 220.0, 0.3, 0.0)], 57.0, true, 0.0).unwrap();
        let partials = import_spc(&path).unwrap();
        // every slot of the file carries envelope frames
        assert_eq!(partials.len(), 32);
        assert!((partials[0].frequency_at(0.2) - 220.0).abs() < 0.5);
    }

    #[test]
    fn test_rejects_plain_aiff() {
        let aiff = crate::AiffFile::new(vec![0.0; 64], 44100.0).unwrap();
        assert!(matches!(
            SpcFile::from_bytes(&aiff.to_bytes(24).unwrap()),
            Err(FileError::Format(_))
        ));
    }
}
