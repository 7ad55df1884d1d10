//! Fixed-width field extraction from raw header buffers.
//!
//! Both PSI file families were written by little-endian front ends and store
//! 2 and 4 byte two's complement integers and IEEE-754 single precision floats.
//! Every multi-byte field is decoded explicitly as little-endian, independent
//! of the host, and every access is bounds checked.
use byteorder::{ByteOrder, LittleEndian};

use super::error::{CapacityError, FieldError};

/// Borrow `width` bytes at `offset`, or report where the field fell off the buffer
fn field(buffer: &[u8], offset: usize, width: usize) -> Result<&[u8], FieldError> {
    buffer
        .get(offset..offset + width)
        .ok_or(FieldError::OutOfBounds {
            offset,
            width,
            len: buffer.len(),
        })
}

/// Signed 16 bit integer
pub fn read_i16(buffer: &[u8], offset: usize) -> Result<i16, FieldError> {
    Ok(LittleEndian::read_i16(field(buffer, offset, 2)?))
}

/// Signed 32 bit integer
pub fn read_i32(buffer: &[u8], offset: usize) -> Result<i32, FieldError> {
    Ok(LittleEndian::read_i32(field(buffer, offset, 4)?))
}

/// Unsigned 32 bit integer
pub fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, FieldError> {
    Ok(LittleEndian::read_u32(field(buffer, offset, 4)?))
}

/// IEEE-754 single precision float
pub fn read_f32(buffer: &[u8], offset: usize) -> Result<f32, FieldError> {
    Ok(LittleEndian::read_f32(field(buffer, offset, 4)?))
}

/// Raw bytes of a fixed-width text field, cut at the first NUL
pub fn read_raw_text(buffer: &[u8], offset: usize, width: usize) -> Result<&[u8], FieldError> {
    let bytes = field(buffer, offset, width)?;
    Ok(match bytes.iter().position(|b| *b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    })
}

/// Fixed-width text field as a String.
///
/// The field ends at the first NUL or at `width`. Bytes are taken as Latin-1 (the
/// front ends wrote 8 bit ASCII) and trailing whitespace is trimmed.
pub fn read_text(buffer: &[u8], offset: usize, width: usize) -> Result<String, FieldError> {
    Ok(latin1_to_string(read_raw_text(buffer, offset, width)?))
}

/// Decode Latin-1 bytes and trim trailing whitespace
pub fn latin1_to_string(bytes: &[u8]) -> String {
    let text: String = bytes.iter().map(|b| *b as char).collect();
    text.trim_end().to_string()
}

/// Reinterpret a block of little-endian 32 bit words.
///
/// Trailing bytes which do not fill a whole word are ignored.
pub fn read_u32_block(buffer: &[u8]) -> Vec<u32> {
    let mut words = vec![0u32; buffer.len() / 4];
    LittleEndian::read_u32_into(&buffer[..words.len() * 4], &mut words);
    words
}

/// A zero filled buffer of `len` bytes, or an error if it cannot be allocated
pub fn zeroed_buffer(len: usize) -> Result<Vec<u8>, CapacityError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| CapacityError::Buffer(len))?;
    buffer.resize(len, 0);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_little_endian() {
        let buffer = [0x34, 0x12, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(read_i16(&buffer, 0).unwrap(), 0x1234);
        assert_eq!(read_i32(&buffer, 2).unwrap(), -1);
        assert_eq!(read_u32(&buffer, 2).unwrap(), u32::MAX);
    }

    #[test]
    fn test_float() {
        let buffer = 0.25f32.to_le_bytes();
        assert_eq!(read_f32(&buffer, 0).unwrap(), 0.25);
    }

    #[test]
    fn test_out_of_bounds() {
        let buffer = [0u8; 4];
        assert_eq!(
            read_i32(&buffer, 2),
            Err(FieldError::OutOfBounds {
                offset: 2,
                width: 4,
                len: 4
            })
        );
        assert!(read_text(&buffer, 3, 2).is_err());
    }

    #[test]
    fn test_text_stops_at_nul_and_trims() {
        let buffer = b"Ag  \0junk  ";
        assert_eq!(read_text(buffer, 0, 11).unwrap(), "Ag");
        assert_eq!(read_text(b"10K       ", 0, 10).unwrap(), "10K");
        assert_eq!(read_text(&[0xb5, b'S', b'R'], 0, 3).unwrap(), "\u{b5}SR");
    }

    #[test]
    fn test_u32_block() {
        let mut buffer = Vec::new();
        for v in [1u32, 2, 70000] {
            buffer.extend_from_slice(&v.to_le_bytes());
        }
        buffer.push(9);
        assert_eq!(read_u32_block(&buffer), vec![1, 2, 70000]);
    }

    #[test]
    fn test_zeroed_buffer() {
        assert_eq!(zeroed_buffer(3).unwrap(), vec![0, 0, 0]);
        assert_eq!(
            zeroed_buffer(usize::MAX),
            Err(CapacityError::Buffer(usize::MAX))
        );
    }
}
