//! SDIF partial files
//!
//! Bandwidth-enhanced partials are stored as `RBEP` frames with exact
//! breakpoint timing, sine-only partials as `1TRC` frames on a uniform
//! grid. Partial labels travel in a single `RBEL` frame ahead of the data.

use crate::error::{FileError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rbe_model::{Breakpoint, Marker, Partial, PartialList};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

const HEADER_ID: &[u8; 4] = b"SDIF";
const ENHANCED_ID: &[u8; 4] = b"RBEP";
const SINE_ONLY_ID: &[u8; 4] = b"1TRC";
const LABELS_ID: &[u8; 4] = b"RBEL";

const SPEC_VERSION: u32 = 3;
const TYPES_VERSION: u32 = 1;
const FLOAT4: u32 = 0x0004;
const FLOAT8: u32 = 0x0008;

const ENVELOPE_STREAM: i32 = 1;
const LABEL_STREAM: i32 = 2;

/// Columns understood on import, in file order
const MAX_COLUMNS: usize = 7;

/// Which matrix layout to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdifFormat {
    /// `RBEP`: index, frequency, amplitude, phase, bandwidth, time offset
    #[default]
    Enhanced,
    /// `1TRC`: index, frequency, amplitude, phase, resampled on a grid
    SineOnly,
}

/// A collection of partials read from or bound for an SDIF file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdifFile {
    partials: PartialList,
    markers: Vec<Marker>,
}

impl SdifFile {
    /// Frame spacing of sine-only exports
    pub const DEFAULT_FRAME_INTERVAL: f64 = 0.005;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_partials(partials: PartialList) -> Self {
        Self {
            partials,
            markers: Vec::new(),
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let file = Self::from_bytes(&bytes)?;
        if file.partials.is_empty() {
            tracing::warn!(path = %path.as_ref().display(), "no partials found in SDIF file");
        }
        Ok(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(bytes);
        let mut id = [0u8; 4];
        if r.read_exact(&mut id).is_err() || &id != HEADER_ID {
            return Err(FileError::Format("missing SDIF header".into()));
        }
        let header_size = u64::from(r.read_u32::<BigEndian>()?);
        r.set_position(8 + header_size);

        let mut rows = RowCollector::default();
        let mut frames = 0usize;
        while bytes.len() as u64 - r.position().min(bytes.len() as u64) >= 8 {
            r.read_exact(&mut id)?;
            let size = u64::from(r.read_u32::<BigEndian>()?);
            let frame_end = r.position() + size;
            if [ENHANCED_ID, SINE_ONLY_ID, LABELS_ID].contains(&&id) {
                read_frame(&mut r, &mut rows)?;
                frames += 1;
            }
            r.set_position(frame_end);
        }

        let partials = rows.into_partials();
        tracing::debug!(frames, partials = partials.len(), "read SDIF");
        Ok(Self::from_partials(partials))
    }

    /// Write to `path` in the given layout
    pub fn write(&self, path: impl AsRef<Path>, format: SdifFormat) -> Result<()> {
        let bytes = self.to_bytes(format)?;
        fs::write(path.as_ref(), &bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            partials = self.partials.len(),
            bytes = bytes.len(),
            ?format,
            "wrote SDIF"
        );
        Ok(())
    }

    pub fn to_bytes(&self, format: SdifFormat) -> Result<Vec<u8>> {
        let indexed: Vec<&Partial> = self.partials.iter().filter(|p| !p.is_empty()).collect();
        let mut out = Vec::new();
        out.write_all(HEADER_ID)?;
        out.write_u32::<BigEndian>(8)?;
        out.write_u32::<BigEndian>(SPEC_VERSION)?;
        out.write_u32::<BigEndian>(TYPES_VERSION)?;

        if indexed.iter().any(|p| p.label() != 0) {
            let data: Vec<f64> = indexed
                .iter()
                .enumerate()
                .flat_map(|(i, p)| [i as f64, f64::from(p.label())])
                .collect();
            write_frame(&mut out, LABELS_ID, LABEL_STREAM, 0.0, 2, &data)?;
        }

        match format {
            SdifFormat::Enhanced => write_enhanced(&mut out, &indexed)?,
            SdifFormat::SineOnly => write_sine_only(&mut out, &indexed, Self::DEFAULT_FRAME_INTERVAL)?,
        }
        Ok(out)
    }

    pub fn partials(&self) -> &PartialList {
        &self.partials
    }

    pub fn partials_mut(&mut self) -> &mut PartialList {
        &mut self.partials
    }

    pub fn into_partials(self) -> PartialList {
        self.partials
    }

    pub fn add_partial(&mut self, partial: Partial) {
        self.partials.push(partial);
    }

    /// Markers are kept with the file in memory but not written to disk
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }
}

/// Write one frame holding one float8 matrix of the same signature
fn write_frame<W: Write>(
    w: &mut W,
    signature: &[u8; 4],
    stream: i32,
    time: f64,
    columns: usize,
    data: &[f64],
) -> io::Result<()> {
    let rows = if columns == 0 { 0 } else { data.len() / columns };
    // time, stream id, matrix count, matrix header, data
    let size = 8 + 4 + 4 + 16 + data.len() * 8;
    w.write_all(signature)?;
    w.write_u32::<BigEndian>(size as u32)?;
    w.write_f64::<BigEndian>(time)?;
    w.write_i32::<BigEndian>(stream)?;
    w.write_u32::<BigEndian>(1)?;

    w.write_all(signature)?;
    w.write_u32::<BigEndian>(FLOAT8)?;
    w.write_u32::<BigEndian>(rows as u32)?;
    w.write_u32::<BigEndian>(columns as u32)?;
    for &v in data {
        w.write_f64::<BigEndian>(v)?;
    }
    Ok(())
}

/// Phase in [0, 2π)
fn positive_phase(phase: f64) -> f64 {
    phase.rem_euclid(2.0 * PI)
}

/// A frame start on the millisecond grid (or the tenth-millisecond grid)
/// just before `time` and after the previous frame
fn frame_time(time: f64, previous: Option<f64>) -> f64 {
    let after = |t: f64| previous.map_or(true, |p| t > p);
    let ms = (1000.0 * time - 0.001).floor() / 1000.0;
    if after(ms) {
        return ms;
    }
    let tenth = (10000.0 * time - 0.01).floor() / 10000.0;
    if after(tenth) {
        tenth
    } else {
        time
    }
}

fn write_enhanced<W: Write>(w: &mut W, partials: &[&Partial]) -> io::Result<()> {
    let mut points: Vec<(f64, usize, Breakpoint)> = partials
        .iter()
        .enumerate()
        .flat_map(|(i, p)| p.iter().map(move |&(t, bp)| (t, i, bp)))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    // a frame closes when one of its partials would get a second breakpoint
    let mut in_frame = vec![usize::MAX; partials.len()];
    let mut frame_no = 0usize;
    let mut current: Option<(f64, Vec<f64>)> = None;
    let mut frames = 0usize;
    for (t, index, bp) in points {
        let full = current.is_none() || in_frame[index] == frame_no;
        if full {
            let previous = match current.take() {
                Some((time, data)) => {
                    write_frame(w, ENHANCED_ID, ENVELOPE_STREAM, time, 6, &data)?;
                    frames += 1;
                    Some(time)
                }
                None => None,
            };
            frame_no += 1;
            current = Some((frame_time(t, previous), Vec::new()));
        }
        if let Some((time, data)) = current.as_mut() {
            in_frame[index] = frame_no;
            data.extend_from_slice(&[
                index as f64,
                bp.frequency,
                bp.amplitude,
                positive_phase(bp.phase),
                bp.bandwidth,
                t - *time,
            ]);
        }
    }
    if let Some((time, data)) = current {
        write_frame(w, ENHANCED_ID, ENVELOPE_STREAM, time, 6, &data)?;
        frames += 1;
    }
    tracing::debug!(frames, "wrote RBEP frames");
    Ok(())
}

fn write_sine_only<W: Write>(w: &mut W, partials: &[&Partial], interval: f64) -> io::Result<()> {
    if partials.is_empty() {
        return Ok(());
    }
    let start = partials.iter().map(|p| p.start_time()).fold(f64::INFINITY, f64::min);
    let end = partials.iter().map(|p| p.end_time()).fold(f64::NEG_INFINITY, f64::max);
    let first = (start / interval).floor() as i64;
    let last = (end / interval).ceil() as i64;

    let mut frames = 0usize;
    for k in first..=last {
        let time = k as f64 * interval;
        let data: Vec<f64> = partials
            .iter()
            .enumerate()
            .filter(|(_, p)| p.amplitude_at(time) > 0.0)
            .flat_map(|(i, p)| {
                [
                    i as f64,
                    p.frequency_at(time),
                    p.amplitude_at(time),
                    positive_phase(p.phase_at(time)),
                ]
            })
            .collect();
        if !data.is_empty() {
            write_frame(w, SINE_ONLY_ID, ENVELOPE_STREAM, time, 4, &data)?;
            frames += 1;
        }
    }
    tracing::debug!(frames, interval, "wrote 1TRC frames");
    Ok(())
}

/// Row values in import column order; absent columns read as zero
#[derive(Debug, Default, Clone, Copy)]
struct Row {
    index: f64,
    freq_or_label: f64,
    amplitude: f64,
    phase: f64,
    bandwidth: f64,
    time_offset: f64,
    resampled: f64,
}

impl From<[f64; MAX_COLUMNS]> for Row {
    fn from(v: [f64; MAX_COLUMNS]) -> Self {
        Self {
            index: v[0],
            freq_or_label: v[1],
            amplitude: v[2],
            phase: v[3],
            bandwidth: v[4],
            time_offset: v[5],
            resampled: v[6],
        }
    }
}

#[derive(Debug, Default)]
struct RowCollector {
    partials: BTreeMap<usize, Partial>,
    labels: BTreeMap<usize, i32>,
}

impl RowCollector {
    fn add(&mut self, signature: &[u8; 4], time: f64, row: Row) {
        let index = row.index.max(0.0) as usize;
        if signature == LABELS_ID {
            self.labels.insert(index, row.freq_or_label as i32);
        } else if row.resampled == 0.0 {
            let bp = Breakpoint::new(row.freq_or_label, row.amplitude, row.bandwidth, row.phase);
            self.partials
                .entry(index)
                .or_default()
                .insert(time + row.time_offset, bp);
        }
    }

    fn into_partials(self) -> PartialList {
        let labels = self.labels;
        self.partials
            .into_iter()
            .filter(|(_, p)| !p.is_empty())
            .map(|(index, mut p)| {
                if let Some(&label) = labels.get(&index) {
                    p.set_label(label);
                }
                p
            })
            .collect()
    }
}

/// Read the rest of a frame header and its matrices
fn read_frame(r: &mut Cursor<&[u8]>, rows: &mut RowCollector) -> Result<()> {
    let time = r.read_f64::<BigEndian>()?;
    let _stream = r.read_i32::<BigEndian>()?;
    let matrices = r.read_u32::<BigEndian>()?;

    for _ in 0..matrices {
        let mut signature = [0u8; 4];
        r.read_exact(&mut signature)?;
        let data_type = r.read_u32::<BigEndian>()?;
        let row_count = r.read_u32::<BigEndian>()? as usize;
        let columns = r.read_u32::<BigEndian>()? as usize;
        let width = (data_type & 0xff) as usize;
        let padded = row_count
            .checked_mul(columns)
            .and_then(|n| n.checked_mul(width))
            .and_then(|len| len.checked_next_multiple_of(8))
            .ok_or_else(|| FileError::Format("SDIF matrix size overflows".into()))?;
        let data_start = r.position();
        let available = r.get_ref().len() as u64 - data_start.min(r.get_ref().len() as u64);
        if padded as u64 > available {
            return Err(FileError::Format(format!(
                "SDIF matrix of {row_count}x{columns} runs past the end of the data"
            )));
        }

        let known = [ENHANCED_ID, SINE_ONLY_ID, LABELS_ID].contains(&&signature);
        if known && (data_type == FLOAT4 || data_type == FLOAT8) {
            for _ in 0..row_count {
                let mut values = [0.0; MAX_COLUMNS];
                for col in 0..columns {
                    let v = if data_type == FLOAT4 {
                        f64::from(r.read_f32::<BigEndian>()?)
                    } else {
                        r.read_f64::<BigEndian>()?
                    };
                    if let Some(slot) = values.get_mut(col) {
                        *slot = v;
                    }
                }
                rows.add(&signature, time, Row::from(values));
            }
        } else if known {
            return Err(FileError::Format(format!(
                "unsupported SDIF matrix data type {data_type:#06x}"
            )));
        }
        r.set_position(data_start + padded as u64);
    }
    Ok(())
}

/// Read partials from an SDIF file
pub fn import_sdif(path: impl AsRef<Path>) -> Result<PartialList> {
    Ok(SdifFile::read(path)?.into_partials())
}

/// Write bandwidth-enhanced partials to an SDIF file
pub fn export_sdif(path: impl AsRef<Path>, partials: &[Partial]) -> Result<()> {
    SdifFile::from_partials(partials.to_vec()).write(path, SdifFormat::Enhanced)
}
