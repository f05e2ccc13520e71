//! Utils

use snafu::Snafu;

/// Maximum number of bytes a var uint can occupy. `ceil(64 / 7)`
pub const MAX_VAR_UINT_SIZE: usize = 10;

#[allow(missing_docs)]
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum VarUintError {
    #[snafu(display("Var uint is truncated, the input ends after {read} bytes"))]
    Truncated { read: usize },
    #[snafu(display("Var uint does not fit in u64"))]
    Overflow,
}

/// Number of bytes the LEB128 representation of `value` occupies
#[inline]
pub fn var_uint_size(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append the little-endian base-128 representation of `value` to `out`
#[inline]
pub fn write_var_uint(mut value: u64, out: &mut Vec<u8>) {
    while value > 0x7F {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Write the little-endian base-128 representation of `value` to the start of `out`,
/// returns number of bytes written
///
/// # Panics
///
/// Panics if `out` is shorter than [`var_uint_size`]
#[inline]
pub fn encode_var_uint(mut value: u64, out: &mut [u8]) -> usize {
    let mut index = 0;
    while value > 0x7F {
        out[index] = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
        index += 1;
    }
    out[index] = value as u8;
    index + 1
}

/// Decode the var uint at the start of `bytes`, returns the value and the number of bytes
/// it occupies
pub fn decode_var_uint(bytes: &[u8]) -> Result<(u64, usize), VarUintError> {
    let mut value = 0_u64;
    for (index, &byte) in bytes.iter().take(MAX_VAR_UINT_SIZE).enumerate() {
        let payload = (byte & 0x7F) as u64;
        if index == MAX_VAR_UINT_SIZE - 1 && payload > 1 {
            // The 10th byte can only carry the highest bit
            return OverflowSnafu.fail();
        }
        value |= payload << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }

    if bytes.len() >= MAX_VAR_UINT_SIZE {
        OverflowSnafu.fail()
    } else {
        TruncatedSnafu { read: bytes.len() }.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_uint() {
        let mut buf = Vec::new();
        write_var_uint(0, &mut buf);
        write_var_uint(127, &mut buf);
        write_var_uint(128, &mut buf);
        write_var_uint(300, &mut buf);
        assert_eq!(buf, [0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);

        assert_eq!(decode_var_uint(&buf[0..]), Ok((0, 1)));
        assert_eq!(decode_var_uint(&buf[1..]), Ok((127, 1)));
        assert_eq!(decode_var_uint(&buf[2..]), Ok((128, 2)));
        assert_eq!(decode_var_uint(&buf[4..]), Ok((300, 2)));
    }

    #[test]
    fn test_var_uint_size() {
        for value in [0, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_var_uint(value, &mut buf);
            assert_eq!(buf.len(), var_uint_size(value));

            let mut fixed = [0; MAX_VAR_UINT_SIZE];
            assert_eq!(encode_var_uint(value, &mut fixed), buf.len());
            assert_eq!(&fixed[..buf.len()], buf.as_slice());
            assert_eq!(decode_var_uint(&buf), Ok((value, buf.len())));
        }
        assert_eq!(var_uint_size(u64::MAX), MAX_VAR_UINT_SIZE);
    }

    #[test]
    fn test_malformed_var_uint() {
        assert_eq!(decode_var_uint(&[]), Err(VarUintError::Truncated { read: 0 }));
        assert_eq!(
            decode_var_uint(&[0x80, 0x80]),
            Err(VarUintError::Truncated { read: 2 })
        );
        assert_eq!(decode_var_uint(&[0xFF; 10]), Err(VarUintError::Overflow));
        assert_eq!(decode_var_uint(&[0xFF; 12]), Err(VarUintError::Overflow));
    }
}
