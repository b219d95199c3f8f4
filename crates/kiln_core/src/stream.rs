//! Binary stream primitives used by scene persistence.
//!
//! Extension traits over `std::io::Write` / `std::io::Read`. All integers are
//! little-endian; variable-length data carries a `u32` length prefix.

use bytemuck::Pod;
use std::io::{self, Read, Write};
use std::mem::size_of;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("stream ended before the expected data")]
    Truncated,

    #[error("not a scene stream (magic {found:?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported scene stream version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("entity id 0 found in stream")]
    InvalidEntity,

    #[error("block length mismatch: expected {expected} bytes, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("length {len} does not fit a 32-bit length prefix")]
    LengthOverflow { len: usize },

    #[error("length-prefixed string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Writing half of the scene stream.
pub trait WriteStream: Write {
    fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_all(&[value])?;
        Ok(())
    }

    fn write_u16_le(&mut self, value: u16) -> Result<(), StreamError> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_le(&mut self, value: u32) -> Result<(), StreamError> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_u64_le(&mut self, value: u64) -> Result<(), StreamError> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_f32_le(&mut self, value: f32) -> Result<(), StreamError> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a `u32` length prefix.
    fn write_len(&mut self, len: usize) -> Result<(), StreamError> {
        let len = u32::try_from(len).map_err(|_| StreamError::LengthOverflow { len })?;
        self.write_u32_le(len)
    }

    /// Length-prefixed byte range.
    fn write_blob(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.write_len(bytes.len())?;
        self.write_all(bytes)?;
        Ok(())
    }

    /// Length-prefixed UTF-8 string.
    fn write_str(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_blob(value.as_bytes())
    }

    /// Element count followed by the raw bytes of a contiguous container.
    ///
    /// Bytes are written in native order; callers that need a portable
    /// layout convert elements before writing (see entity list encoding).
    fn write_pod_slice<T: Pod>(&mut self, values: &[T]) -> Result<(), StreamError> {
        self.write_len(values.len())?;
        self.write_all(bytemuck::cast_slice(values))?;
        Ok(())
    }
}

impl<W: Write + ?Sized> WriteStream for W {}

/// Reading half of the scene stream.
pub trait ReadStream: Read {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        self.read_exact(buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => StreamError::Truncated,
            _ => StreamError::Io(err),
        })
    }

    fn read_u8(&mut self) -> Result<u8, StreamError> {
        let mut buf = [0u8; 1];
        self.read_exact_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_le(&mut self) -> Result<u16, StreamError> {
        let mut buf = [0u8; 2];
        self.read_exact_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&mut self) -> Result<u32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_exact_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> Result<u64, StreamError> {
        let mut buf = [0u8; 8];
        self.read_exact_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_f32_le(&mut self) -> Result<f32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_exact_bytes(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    fn read_len(&mut self) -> Result<usize, StreamError> {
        let len = self.read_u32_le()?;
        usize::try_from(len).map_err(|_| StreamError::LengthOverflow { len: usize::MAX })
    }

    /// Length-prefixed byte range.
    fn read_blob(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_len()?;
        // Grow with the data actually present instead of trusting the prefix.
        let mut out = Vec::new();
        (&mut *self).take(len as u64).read_to_end(&mut out)?;
        if out.len() != len {
            return Err(StreamError::Truncated);
        }
        Ok(out)
    }

    fn read_string(&mut self) -> Result<String, StreamError> {
        Ok(String::from_utf8(self.read_blob()?)?)
    }

    /// Inverse of [`WriteStream::write_pod_slice`].
    fn read_pod_vec<T: Pod>(&mut self) -> Result<Vec<T>, StreamError> {
        let count = self.read_len()?;
        let byte_len = count
            .checked_mul(size_of::<T>())
            .ok_or(StreamError::LengthOverflow { len: usize::MAX })?;
        let mut bytes = Vec::new();
        (&mut *self).take(byte_len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != byte_len {
            return Err(StreamError::Truncated);
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl<R: Read + ?Sized> ReadStream for R {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_and_blobs_carry_length_prefixes() {
        let mut out = Vec::new();
        out.write_str("albedo").unwrap();
        out.write_blob(&[1, 2, 3]).unwrap();
        assert_eq!(&out[..4], &6u32.to_le_bytes());

        let mut input = out.as_slice();
        assert_eq!(input.read_string().unwrap(), "albedo");
        assert_eq!(input.read_blob().unwrap(), vec![1, 2, 3]);
        assert!(input.is_empty());
    }

    #[test]
    fn pod_slices_keep_element_count() {
        let mut out = Vec::new();
        out.write_pod_slice(&[10u64, 20, 30]).unwrap();
        assert_eq!(out.len(), 4 + 3 * 8);

        let values: Vec<u64> = out.as_slice().read_pod_vec().unwrap();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn short_input_reports_truncation() {
        let mut out = Vec::new();
        out.write_blob(&[9; 16]).unwrap();
        out.truncate(10);

        let err = out.as_slice().read_blob().unwrap_err();
        assert!(matches!(err, StreamError::Truncated));

        let mut empty: &[u8] = &[];
        assert!(matches!(empty.read_u32_le(), Err(StreamError::Truncated)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut out = Vec::new();
        out.write_blob(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            out.as_slice().read_string(),
            Err(StreamError::InvalidUtf8(_))
        ));
    }
}
