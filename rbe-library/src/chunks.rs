//! AIFF container chunks
//!
//! Shared by plain sample files and Kyma spectral envelope files, which are
//! AIFF files with an extra application chunk.

use crate::error::{FileError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rbe_model::Marker;
use std::io::{self, Cursor, Read, Write};

pub(crate) const FORM_ID: &[u8; 4] = b"FORM";
pub(crate) const AIFF_TYPE: &[u8; 4] = b"AIFF";
pub(crate) const AIFC_TYPE: &[u8; 4] = b"AIFC";
pub(crate) const COMMON_ID: &[u8; 4] = b"COMM";
pub(crate) const SOUND_DATA_ID: &[u8; 4] = b"SSND";
pub(crate) const MARKER_ID: &[u8; 4] = b"MARK";
pub(crate) const INSTRUMENT_ID: &[u8; 4] = b"INST";
pub(crate) const APPLICATION_ID: &[u8; 4] = b"APPL";

/// Longest marker name that fits a pascal string with its pad byte
const MAX_NAME_LEN: usize = 254;

/// Write an 80-bit IEEE extended float
pub(crate) fn write_extended80<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    if value == 0.0 || !value.is_finite() || value.is_subnormal() {
        writer.write_u16::<BigEndian>(0)?;
        return writer.write_u64::<BigEndian>(0);
    }
    let bits = value.abs().to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32 - 1023;
    let mantissa = ((bits & ((1 << 52) - 1)) | (1 << 52)) << 11;
    let sign = if value < 0.0 { 0x8000 } else { 0 };
    writer.write_u16::<BigEndian>(sign | (exponent + 16383) as u16)?;
    writer.write_u64::<BigEndian>(mantissa)
}

/// Read an 80-bit IEEE extended float
pub(crate) fn read_extended80<R: Read>(reader: &mut R) -> io::Result<f64> {
    let sign_exp = reader.read_u16::<BigEndian>()?;
    let mantissa = reader.read_u64::<BigEndian>()?;
    if mantissa == 0 {
        return Ok(0.0);
    }
    let exponent = i32::from(sign_exp & 0x7fff) - 16383 - 63;
    let value = mantissa as f64 * 2f64.powi(exponent);
    Ok(if sign_exp & 0x8000 != 0 { -value } else { value })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CommonChunk {
    pub channels: u16,
    pub sample_frames: u32,
    pub bits_per_sample: u16,
    pub sample_rate: f64,
}

impl CommonChunk {
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self.channels)?;
        writer.write_u32::<BigEndian>(self.sample_frames)?;
        writer.write_u16::<BigEndian>(self.bits_per_sample)?;
        write_extended80(writer, self.sample_rate)
    }
}

/// Base note and detune, stored so that `note = base - detune / 100`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InstrumentChunk {
    pub base_note: u8,
    pub detune: i8,
}

impl InstrumentChunk {
    pub fn from_midi_note(note: f64) -> Self {
        let cents = (note.clamp(0.0, 127.0) * 100.0).round() as i64;
        let mut base = cents / 100;
        let mut detune = cents % 100;
        if detune > 50 {
            base += 1;
            detune -= 100;
        }
        Self {
            base_note: base.clamp(0, 127) as u8,
            detune: (-detune) as i8,
        }
    }

    pub fn midi_note(&self) -> f64 {
        f64::from(self.base_note) - 0.01 * f64::from(self.detune)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.base_note)?;
        writer.write_i8(self.detune)?;
        // note range, velocity range, gain
        writer.write_u8(0)?;
        writer.write_u8(127)?;
        writer.write_u8(1)?;
        writer.write_u8(127)?;
        writer.write_i16::<BigEndian>(0)?;
        // sustain and release loops: play mode, begin, end
        for _ in 0..6 {
            writer.write_u16::<BigEndian>(0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarkerEntry {
    pub id: u16,
    pub position: u32,
    pub name: String,
}

/// Number markers from 1, placing each with `position`. MARK counts and
/// ids are 16-bit.
pub(crate) fn marker_entries(
    markers: &[Marker],
    position: impl Fn(&Marker) -> u32,
) -> Result<Vec<MarkerEntry>> {
    markers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let id = u16::try_from(i + 1).map_err(|_| {
                FileError::Format(format!("too many markers ({}) for a MARK chunk", markers.len()))
            })?;
            Ok(MarkerEntry {
                id,
                position: position(m),
                name: m.name.clone(),
            })
        })
        .collect()
}

pub(crate) fn write_markers<W: Write>(writer: &mut W, markers: &[MarkerEntry]) -> Result<()> {
    let count = u16::try_from(markers.len()).map_err(|_| {
        FileError::Format(format!("too many markers ({}) for a MARK chunk", markers.len()))
    })?;
    writer.write_u16::<BigEndian>(count)?;
    for marker in markers {
        writer.write_u16::<BigEndian>(marker.id)?;
        writer.write_u32::<BigEndian>(marker.position)?;
        let name = truncated_name(&marker.name);
        writer.write_u8(name.len() as u8)?;
        writer.write_all(name)?;
        // count byte plus characters must be even
        if name.len() % 2 == 0 {
            writer.write_u8(0)?;
        }
    }
    Ok(())
}

fn truncated_name(name: &str) -> &[u8] {
    let bytes = name.as_bytes();
    &bytes[..bytes.len().min(MAX_NAME_LEN)]
}

/// Append a chunk with its header and pad byte
pub(crate) fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], data: &[u8]) -> io::Result<()> {
    out.write_all(id)?;
    out.write_u32::<BigEndian>(data.len() as u32)?;
    out.write_all(data)?;
    if data.len() % 2 == 1 {
        out.write_u8(0)?;
    }
    Ok(())
}

/// Wrap chunks in a FORM container of the given type
pub(crate) fn write_form(form_type: &[u8; 4], chunks: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(chunks.len() + 12);
    out.write_all(FORM_ID)?;
    out.write_u32::<BigEndian>((chunks.len() + 4) as u32)?;
    out.write_all(form_type)?;
    out.write_all(chunks)?;
    Ok(out)
}

/// Sound data chunk body with zero offset and block size
pub(crate) fn sound_data(samples: &[u8]) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(samples.len() + 8);
    data.write_u32::<BigEndian>(0)?;
    data.write_u32::<BigEndian>(0)?;
    data.write_all(samples)?;
    Ok(data)
}

/// Everything of interest found in an AIFF container
#[derive(Debug, Default)]
pub(crate) struct AiffChunks {
    pub common: Option<CommonChunk>,
    pub sound_data: Option<Vec<u8>>,
    pub markers: Vec<MarkerEntry>,
    pub instrument: Option<InstrumentChunk>,
    /// Application chunks as (signature, data after the signature)
    pub applications: Vec<([u8; 4], Vec<u8>)>,
}

impl AiffChunks {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut id = [0u8; 4];
        cursor.read_exact(&mut id)?;
        if &id != FORM_ID {
            return Err(FileError::Format("missing FORM container".into()));
        }
        let _form_size = cursor.read_u32::<BigEndian>()?;
        let mut form_type = [0u8; 4];
        cursor.read_exact(&mut form_type)?;
        let compressed = match &form_type {
            t if t == AIFF_TYPE => false,
            t if t == AIFC_TYPE => true,
            _ => {
                return Err(FileError::Format(format!(
                    "bad form type {}",
                    String::from_utf8_lossy(&form_type)
                )))
            }
        };

        let mut chunks = Self::default();
        while bytes.len() as u64 - cursor.position() >= 8 {
            cursor.read_exact(&mut id)?;
            let size = cursor.read_u32::<BigEndian>()? as usize;
            let start = cursor.position() as usize;
            let end = start.saturating_add(size).min(bytes.len());
            let data = &bytes[start..end];

            match &id {
                i if i == COMMON_ID => chunks.common = Some(parse_common(data, compressed)?),
                i if i == SOUND_DATA_ID => chunks.sound_data = Some(parse_sound_data(data)?),
                i if i == MARKER_ID => chunks.markers = parse_markers(data)?,
                i if i == INSTRUMENT_ID => {
                    let mut r = Cursor::new(data);
                    chunks.instrument = Some(InstrumentChunk {
                        base_note: r.read_u8()?,
                        detune: r.read_i8()?,
                    });
                }
                i if i == APPLICATION_ID && data.len() >= 4 => {
                    let mut signature = [0u8; 4];
                    signature.copy_from_slice(&data[..4]);
                    chunks.applications.push((signature, data[4..].to_vec()));
                }
                _ => {}
            }
            cursor.set_position((end + size % 2).min(bytes.len()) as u64);
        }
        Ok(chunks)
    }

    /// Data of the first application chunk with `signature`
    pub fn application(&self, signature: &[u8; 4]) -> Option<&[u8]> {
        self.applications
            .iter()
            .find(|(sig, _)| sig == signature)
            .map(|(_, data)| data.as_slice())
    }
}

fn parse_common(data: &[u8], compressed: bool) -> Result<CommonChunk> {
    let mut r = Cursor::new(data);
    let common = CommonChunk {
        channels: r.read_u16::<BigEndian>()?,
        sample_frames: r.read_u32::<BigEndian>()?,
        bits_per_sample: r.read_u16::<BigEndian>()?,
        sample_rate: read_extended80(&mut r)?,
    };
    if compressed {
        let mut compression = [0u8; 4];
        r.read_exact(&mut compression)?;
        if &compression != b"NONE" {
            return Err(FileError::Format(format!(
                "unsupported AIFC compression {}",
                String::from_utf8_lossy(&compression)
            )));
        }
    }
    Ok(common)
}

fn parse_sound_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut r = Cursor::new(data);
    let offset = r.read_u32::<BigEndian>()? as usize;
    let _block_size = r.read_u32::<BigEndian>()?;
    let start = (8 + offset).min(data.len());
    Ok(data[start..].to_vec())
}

fn parse_markers(data: &[u8]) -> Result<Vec<MarkerEntry>> {
    let mut r = Cursor::new(data);
    let count = r.read_u16::<BigEndian>()?;
    let mut markers = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = r.read_u16::<BigEndian>()?;
        let position = r.read_u32::<BigEndian>()?;
        let len = usize::from(r.read_u8()?);
        let mut name = vec![0u8; len];
        r.read_exact(&mut name)?;
        if len % 2 == 0 {
            r.read_u8()?;
        }
        markers.push(MarkerEntry {
            id,
            position,
            name: String::from_utf8_lossy(&name).into_owned(),
        });
    }
    Ok(markers)
}

/// Check that `bits` is a supported integer sample size
pub(crate) fn check_bits(bits: u16) -> Result<()> {
    match bits {
        8 | 16 | 24 | 32 => Ok(()),
        _ => Err(FileError::InvalidArgument(format!(
            "unsupported sample size {bits} bits"
        ))),
    }
}

/// Big-endian signed integer samples to floats in [-1, 1)
pub(crate) fn decode_samples(bytes: &[u8], bits: u16) -> Result<Vec<f64>> {
    check_bits(bits)?;
    let width = usize::from(bits / 8);
    let scale = 1.0 / 2f64.powi(i32::from(bits) - 1);
    let samples = bytes
        .chunks_exact(width)
        .map(|frame| {
            let mut r = Cursor::new(frame);
            let value = match bits {
                8 => r.read_i8().map(i64::from),
                16 => r.read_i16::<BigEndian>().map(i64::from),
                24 => r.read_i24::<BigEndian>().map(i64::from),
                _ => r.read_i32::<BigEndian>().map(i64::from),
            };
            value.map(|v| v as f64 * scale)
        })
        .collect::<io::Result<Vec<f64>>>()?;
    Ok(samples)
}

/// Floats to big-endian signed integer samples, clamped to full scale
pub(crate) fn encode_samples(samples: &[f64], bits: u16) -> Result<Vec<u8>> {
    check_bits(bits)?;
    let full_scale = 2f64.powi(i32::from(bits) - 1);
    let mut out = Vec::with_capacity(samples.len() * usize::from(bits / 8));
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * full_scale)
            .round()
            .clamp(-full_scale, full_scale - 1.0) as i64;
        match bits {
            8 => out.write_i8(v as i8)?,
            16 => out.write_i16::<BigEndian>(v as i16)?,
            24 => out.write_i24::<BigEndian>(v as i32)?,
            _ => out.write_i32::<BigEndian>(v as i32)?,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended80_known_rate() {
        // 44100 Hz as stored by every AIFF writer
        let mut buf = Vec::new();
        write_extended80(&mut buf, 44100.0).unwrap();
        assert_eq!(buf, [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]);
        assert_eq!(read_extended80(&mut Cursor::new(&buf)).unwrap(), 44100.0);
    }

    #[test]
    fn test_extended80_fractional_and_zero() {
        for value in [0.0, 22050.5, 1.0e-3, -8000.0] {
            let mut buf = Vec::new();
            write_extended80(&mut buf, value).unwrap();
            assert_eq!(read_extended80(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_instrument_note() {
        for note in [60.0, 60.25, 60.75, 69.5] {
            let inst = InstrumentChunk::from_midi_note(note);
            assert!((inst.midi_note() - note).abs() < 1e-9, "note {note}");
        }
        let inst = InstrumentChunk::from_midi_note(60.75);
        assert_eq!(inst.base_note, 61);
        assert_eq!(inst.detune, 25);
    }

    #[test]
    fn test_sample_quantization() {
        let samples = [0.0, 0.5, -0.5, 1.5, -1.0];
        for bits in [8, 16, 24, 32] {
            let bytes = encode_samples(&samples, bits).unwrap();
            assert_eq!(bytes.len(), samples.len() * usize::from(bits / 8));
            let decoded = decode_samples(&bytes, bits).unwrap();
            assert_eq!(decoded[1], 0.5);
            assert_eq!(decoded[2], -0.5);
            assert!(decoded[3] < 1.0 && decoded[3] > 0.99);
            assert_eq!(decoded[4], -1.0);
        }
        assert!(encode_samples(&samples, 12).is_err());
    }

    #[test]
    fn test_parse_rejects_non_aiff() {
        assert!(matches!(
            AiffChunks::parse(b"RIFF\0\0\0\x04WAVE"),
            Err(FileError::Format(_))
        ));
        let mut form = write_form(b"WAVE", &[]).unwrap();
        form.truncate(12);
        assert!(AiffChunks::parse(&form).is_err());
    }

    #[test]
    fn test_marker_chunk_layout() {
        let markers = vec![
            MarkerEntry { id: 1, position: 100, name: "ab".into() },
            MarkerEntry { id: 2, position: 200, name: "xyz".into() },
        ];
        let mut data = Vec::new();
        write_markers(&mut data, &markers).unwrap();
        // 2 + (6 + 4) + (6 + 4)
        assert_eq!(data.len(), 22);
        assert_eq!(parse_markers(&data).unwrap(), markers);
    }

    #[test]
    fn test_marker_count_limit() {
        let markers: Vec<Marker> = (0..=u16::MAX as usize)
            .map(|i| Marker::new(i as f64, ""))
            .collect();
        assert!(matches!(
            marker_entries(&markers, |m| m.time as u32),
            Err(FileError::Format(_))
        ));

        let entries = marker_entries(&markers[..u16::MAX as usize], |m| m.time as u32).unwrap();
        assert_eq!(entries.last().map(|e| e.id), Some(u16::MAX));
        assert_eq!(entries[9].position, 9);

        let too_many = vec![
            MarkerEntry { id: 1, position: 0, name: String::new() };
            u16::MAX as usize + 1
        ];
        assert!(matches!(
            write_markers(&mut Vec::new(), &too_many),
            Err(FileError::Format(_))
        ));
    }
}
