//! Complex sample type and its byte layout.
//!
//! Samples travel as interleaved little-endian `f32` pairs (I then Q),
//! 8 bytes per sample, with no header. The same layout is used for the
//! transmit file, the capture dump and the forwarded datagrams.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use num_complex::Complex;

/// One complex baseband sample (fc32).
pub type Sample = Complex<f32>;

/// Bytes per encoded sample.
pub const SAMPLE_BYTES: usize = 8;

/// Append `samples` to `out` in wire layout.
pub fn encode_samples(samples: &[Sample], out: &mut BytesMut) {
    out.reserve(samples.len() * SAMPLE_BYTES);
    for s in samples {
        out.put_f32_le(s.re);
        out.put_f32_le(s.im);
    }
}

/// Decode a byte buffer in wire layout. Trailing bytes that do not form a
/// whole sample are an error.
pub fn decode_samples(mut bytes: &[u8]) -> Result<Vec<Sample>, SampleFileError> {
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(SampleFileError::Misaligned(bytes.len()));
    }
    let mut samples = Vec::with_capacity(bytes.len() / SAMPLE_BYTES);
    while bytes.has_remaining() {
        let re = bytes.get_f32_le();
        let im = bytes.get_f32_le();
        samples.push(Sample::new(re, im));
    }
    Ok(samples)
}

/// Load a transmit waveform. An empty file is rejected: a burst needs at
/// least one sample to cycle through.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>, SampleFileError> {
    let bytes = fs::read(path).map_err(|e| SampleFileError::Read(path.to_path_buf(), e))?;
    if bytes.is_empty() {
        return Err(SampleFileError::Empty(path.to_path_buf()));
    }
    decode_samples(&bytes)
}

/// Write a capture to disk, replacing any previous file.
pub fn write_samples(path: &Path, samples: &[Sample]) -> Result<(), SampleFileError> {
    let mut buf = BytesMut::new();
    encode_samples(samples, &mut buf);
    let mut file =
        fs::File::create(path).map_err(|e| SampleFileError::Write(path.to_path_buf(), e))?;
    file.write_all(&buf)
        .map_err(|e| SampleFileError::Write(path.to_path_buf(), e))?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SampleFileError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("{0} contains no samples")]
    Empty(PathBuf),
    #[error("{0} bytes is not a whole number of fc32 samples")]
    Misaligned(usize),
}
