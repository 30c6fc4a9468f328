//! PCM WAV decoding
//!
//! Supports integer PCM (8/16/24/32-bit) and IEEE float (32/64-bit), plain
//! or `WAVE_FORMAT_EXTENSIBLE`. Multi-channel audio is mixed down to mono.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{Error, Result};

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct Wav {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Format {
    encoding: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Read and decode a WAV file
pub fn read_wav(path: &Path) -> Result<Wav> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Feature(format!("{}: {e}", path.display())))?;
    decode_wav(&bytes).map_err(|e| match e {
        Error::Feature(msg) => Error::Feature(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn truncated(_: std::io::Error) -> Error {
    Error::Feature("truncated WAV data".to_string())
}

/// Decode an in-memory WAV file
pub fn decode_wav(bytes: &[u8]) -> Result<Wav> {
    let mut cur = Cursor::new(bytes);
    let mut tag = [0u8; 4];

    cur.read_exact(&mut tag).map_err(truncated)?;
    if &tag != b"RIFF" {
        return Err(Error::Feature("missing RIFF header".to_string()));
    }
    cur.read_u32::<LittleEndian>().map_err(truncated)?;
    cur.read_exact(&mut tag).map_err(truncated)?;
    if &tag != b"WAVE" {
        return Err(Error::Feature("not a WAVE file".to_string()));
    }

    let mut format: Option<Format> = None;
    while cur.read_exact(&mut tag).is_ok() {
        let size = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let start = cur.position() as usize;
        // Streamed files may carry an oversized data length
        let end = start.saturating_add(size).min(bytes.len());

        match &tag {
            b"fmt " => format = Some(parse_format(&bytes[start..end])?),
            b"data" => {
                let format = format.ok_or_else(|| {
                    Error::Feature("data chunk precedes fmt chunk".to_string())
                })?;
                return Ok(Wav {
                    sample_rate: format.sample_rate,
                    samples: decode_samples(&bytes[start..end], &format)?,
                });
            }
            _ => {}
        }

        cur.set_position((end + (size & 1)) as u64);
    }

    Err(Error::Feature("no data chunk".to_string()))
}

fn parse_format(chunk: &[u8]) -> Result<Format> {
    let mut cur = Cursor::new(chunk);
    let mut encoding = cur.read_u16::<LittleEndian>().map_err(truncated)?;
    let channels = cur.read_u16::<LittleEndian>().map_err(truncated)?;
    let sample_rate = cur.read_u32::<LittleEndian>().map_err(truncated)?;
    let _byte_rate = cur.read_u32::<LittleEndian>().map_err(truncated)?;
    let _block_align = cur.read_u16::<LittleEndian>().map_err(truncated)?;
    let bits_per_sample = cur.read_u16::<LittleEndian>().map_err(truncated)?;

    if encoding == FORMAT_EXTENSIBLE {
        // cbSize, valid bits, channel mask, then the sub-format GUID
        if chunk.len() < 26 {
            return Err(Error::Feature("short extensible fmt chunk".to_string()));
        }
        encoding = u16::from_le_bytes([chunk[24], chunk[25]]);
    }

    if channels == 0 {
        return Err(Error::Feature("zero channels".to_string()));
    }

    match (encoding, bits_per_sample) {
        (FORMAT_PCM, 8 | 16 | 24 | 32) | (FORMAT_FLOAT, 32 | 64) => Ok(Format {
            encoding,
            channels,
            sample_rate,
            bits_per_sample,
        }),
        _ => Err(Error::Feature(format!(
            "unsupported encoding {encoding} with {bits_per_sample} bits per sample"
        ))),
    }
}

fn read_sample(cur: &mut Cursor<&[u8]>, format: &Format) -> std::io::Result<f32> {
    Ok(match (format.encoding, format.bits_per_sample) {
        (FORMAT_PCM, 8) => (cur.read_u8()? as f32 - 128.0) / 128.0,
        (FORMAT_PCM, 16) => cur.read_i16::<LittleEndian>()? as f32 / 32_768.0,
        (FORMAT_PCM, 24) => cur.read_i24::<LittleEndian>()? as f32 / 8_388_608.0,
        (FORMAT_PCM, 32) => cur.read_i32::<LittleEndian>()? as f32 / 2_147_483_648.0,
        (FORMAT_FLOAT, 32) => cur.read_f32::<LittleEndian>()?,
        _ => cur.read_f64::<LittleEndian>()? as f32,
    })
}

fn decode_samples(data: &[u8], format: &Format) -> Result<Vec<f32>> {
    let channels = format.channels as usize;
    let frame_bytes = channels * (format.bits_per_sample as usize / 8);
    let frames = data.len() / frame_bytes;

    let mut cur = Cursor::new(data);
    let mut samples = Vec::with_capacity(frames);
    for _ in 0..frames {
        let mut acc = 0.0f32;
        for _ in 0..channels {
            acc += read_sample(&mut cur, format).map_err(truncated)?;
        }
        samples.push(acc / channels as f32);
    }
    Ok(samples)
}

/// Resample by linear interpolation
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from as f64 / to as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let lo = (pos.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = (pos - lo as f64) as f32;
            samples[lo] * (1.0 - frac) + samples[hi] * frac
        })
        .collect()
}

/// Encode mono 16-bit PCM (used to build fixtures)
pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    use byteorder::WriteBytesExt;

    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    let _ = out.write_u32::<LittleEndian>(36 + data_len);
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    let _ = out.write_u32::<LittleEndian>(16);
    let _ = out.write_u16::<LittleEndian>(FORMAT_PCM);
    let _ = out.write_u16::<LittleEndian>(1);
    let _ = out.write_u32::<LittleEndian>(sample_rate);
    let _ = out.write_u32::<LittleEndian>(sample_rate * 2);
    let _ = out.write_u16::<LittleEndian>(2);
    let _ = out.write_u16::<LittleEndian>(16);
    out.extend_from_slice(b"data");
    let _ = out.write_u32::<LittleEndian>(data_len);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32_767.0).round() as i16;
        let _ = out.write_i16::<LittleEndian>(v);
    }
    out
}
