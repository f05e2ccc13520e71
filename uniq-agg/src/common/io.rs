//! Binary read/write helpers of the serialized aggregation states
//!
//! Format:
//! - var uint: little-endian base-128 of `u64`, at most 10 bytes
//! - fixed width value: little-endian bytes, without separators
//! - length-prefixed bytes: var uint length, then the raw bytes

use data_block::utils::{decode_var_uint, VarUintError};
use snafu::{ensure, Snafu};

pub use data_block::utils::write_var_uint;

#[allow(missing_docs)]
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display(
        "Unexpected end of the serialized state, need `{needed}` bytes but only `{remaining}` bytes remain"
    ))]
    UnexpectedEof { needed: usize, remaining: usize },
    #[snafu(display("Var uint in the serialized state does not fit in u64"))]
    VarintOverflow,
    #[snafu(display("Length `{length}` in the serialized state does not fit in usize"))]
    LengthOverflow { length: u64 },
}

type Result<T> = std::result::Result<T, DecodeError>;

/// Cursor over the serialized bytes. Reading never copies, the returned slices borrow
/// the underling bytes
#[derive(Debug, Clone)]
pub struct ReadBuffer<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ReadBuffer<'a> {
    /// Create a new [`ReadBuffer`] that reads from the start of the bytes
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Number of bytes that have not been read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Number of bytes that have been read
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true if all of the bytes have been read
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.position == self.bytes.len()
    }

    /// Read a var uint
    pub fn read_var_uint(&mut self) -> Result<u64> {
        match decode_var_uint(&self.bytes[self.position..]) {
            Ok((value, read)) => {
                self.position += read;
                Ok(value)
            }
            Err(VarUintError::Truncated { read }) => UnexpectedEofSnafu {
                needed: read + 1,
                remaining: read,
            }
            .fail(),
            Err(VarUintError::Overflow) => VarintOverflowSnafu.fail(),
        }
    }

    /// Read a var uint that represents length or count
    #[inline]
    pub fn read_len(&mut self) -> Result<usize> {
        let length = self.read_var_uint()?;
        usize::try_from(length).map_err(|_| DecodeError::LengthOverflow { length })
    }

    /// Read exactly `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            len <= self.remaining(),
            UnexpectedEofSnafu {
                needed: len,
                remaining: self.remaining(),
            }
        );
        let bytes = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read the length-prefixed bytes
    #[inline]
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_bytes(len)
    }
}

/// Write the length-prefixed bytes to `out`
#[inline]
pub fn write_length_prefixed(bytes: &[u8], out: &mut Vec<u8>) {
    write_var_uint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_read_write() {
        let mut out = Vec::new();
        write_var_uint(300, &mut out);
        write_length_prefixed(b"uniq", &mut out);
        write_length_prefixed(b"", &mut out);
        out.push(0xAB);

        let mut buf = ReadBuffer::new(&out);
        assert_eq!(buf.read_len().unwrap(), 300);
        assert_eq!(buf.read_length_prefixed().unwrap(), b"uniq");
        assert_eq!(buf.read_length_prefixed().unwrap(), b"");
        assert_eq!(buf.remaining(), 1);
        assert_eq!(buf.read_bytes(1).unwrap(), &[0xAB]);
        assert!(buf.is_exhausted());
    }

    #[test]
    fn test_truncated() {
        let mut buf = ReadBuffer::new(&[0x80]);
        let error = buf.read_var_uint().unwrap_err();
        expect!["Unexpected end of the serialized state, need `2` bytes but only `1` bytes remain"]
            .assert_eq(&error.to_string());
        // Failed read does not move the cursor
        assert_eq!(buf.position(), 0);

        let mut buf = ReadBuffer::new(&[3, b'a', b'b']);
        assert_eq!(
            buf.read_length_prefixed(),
            Err(DecodeError::UnexpectedEof {
                needed: 3,
                remaining: 2
            })
        );

        let mut buf = ReadBuffer::new(&[]);
        assert!(buf.read_len().is_err());
    }

    #[test]
    fn test_overflow() {
        let mut buf = ReadBuffer::new(&[0xFF; 10]);
        assert_eq!(buf.read_var_uint(), Err(DecodeError::VarintOverflow));
    }
}
