//! Forward-only reader over the skeleton binary buffer.

use crate::Error;
use byteorder::{BigEndian, ByteOrder};

/// Sequential cursor over an immutable byte buffer.
///
/// Fixed-width values are big-endian. Every read either advances the cursor by exactly the bytes
/// it consumed or fails with [`Error::UnexpectedEndOfInput`] without advancing.
#[derive(Clone, Debug)]
pub struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::UnexpectedEndOfInput {
                offset: self.cursor,
                needed: len - self.remaining(),
            });
        }
        let out = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    /// Reads a 1 to 5 byte variable-length integer.
    ///
    /// With `optimize_positive` the raw 32-bit value is returned; otherwise it is zig-zag decoded.
    pub fn read_varint(&mut self, optimize_positive: bool) -> Result<i32, Error> {
        let start = self.cursor;
        let value = match self.read_varint_raw() {
            Ok(v) => v,
            Err(e) => {
                self.cursor = start;
                return Err(e);
            }
        };
        if optimize_positive {
            Ok(value as i32)
        } else {
            Ok((value >> 1) as i32 ^ -((value & 1) as i32))
        }
    }

    fn read_varint_raw(&mut self) -> Result<u32, Error> {
        let mut value = 0u32;
        for shift in [0u32, 7, 14, 21, 28] {
            let b = self.read_u8()?;
            value |= ((b & 0x7F) as u32) << shift;
            if b & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }

    /// Reads a non-negative varint as an index or count.
    pub fn read_count(&mut self) -> Result<usize, Error> {
        Ok(self.read_varint(true)? as u32 as usize)
    }

    /// Reads a length-prefixed modified UTF-8 string. A length of 0 is `None`, 1 is `""`.
    pub fn read_string(&mut self) -> Result<Option<String>, Error> {
        let start = self.cursor;
        let byte_count = self.read_count()?;
        let byte_count = match byte_count {
            0 => return Ok(None),
            1 => return Ok(Some(String::new())),
            n => n - 1,
        };
        if self.remaining() < byte_count {
            let needed = byte_count - self.remaining();
            self.cursor = start;
            return Err(Error::UnexpectedEndOfInput {
                offset: start,
                needed,
            });
        }

        let mut units = Vec::<u16>::with_capacity(byte_count);
        let mut i = 0usize;
        while i < byte_count {
            let b = self.read_u8()?;
            match b >> 4 {
                12 | 13 => {
                    let b2 = self.read_u8()?;
                    units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
                    i += 2;
                }
                14 => {
                    let b2 = self.read_u8()?;
                    let b3 = self.read_u8()?;
                    units.push(
                        (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
                    );
                    i += 3;
                }
                _ => {
                    units.push(b as u16);
                    i += 1;
                }
            }
        }
        Ok(Some(String::from_utf16_lossy(&units)))
    }

    /// Reads a 1-based index into the string table; 0 is `None`.
    pub fn read_string_ref<'s>(&mut self, strings: &'s [String]) -> Result<Option<&'s str>, Error> {
        let offset = self.cursor;
        let index = self.read_count()?;
        if index == 0 {
            return Ok(None);
        }
        strings
            .get(index - 1)
            .map(|s| Some(s.as_str()))
            .ok_or_else(|| {
                Error::malformed(format!(
                    "string reference {index} out of range (table has {}) at offset {offset}",
                    strings.len()
                ))
            })
    }

    /// Reads an RGBA8888 color packed into a big-endian int.
    pub fn read_color(&mut self) -> Result<[f32; 4], Error> {
        let bytes = self.take(4)?;
        Ok([
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(mut value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    #[test]
    fn varint_optimize_positive_is_identity() {
        for n in [
            0u32,
            1,
            127,
            128,
            300,
            16_383,
            16_384,
            2_097_151,
            268_435_455,
            268_435_456,
            i32::MAX as u32,
            0x8000_0000,
            u32::MAX,
        ] {
            let bytes = encode_varint(n);
            let mut input = BinaryInput::new(&bytes);
            assert_eq!(input.read_varint(true).unwrap() as u32, n, "n={n}");
            assert_eq!(input.remaining(), 0);
        }
    }

    #[test]
    fn varint_zigzag_decodes_negative_values() {
        let cases = [(0u32, 0i32), (1, -1), (2, 1), (3, -2), (4_294_967_295, i32::MIN)];
        for (raw, expected) in cases {
            let bytes = encode_varint(raw);
            let mut input = BinaryInput::new(&bytes);
            assert_eq!(input.read_varint(false).unwrap(), expected);
        }
    }

    #[test]
    fn short_buffers_fail_without_advancing() {
        let mut input = BinaryInput::new(&[0x00, 0x01, 0x02]);
        assert!(matches!(
            input.read_i32(),
            Err(Error::UnexpectedEndOfInput { offset: 0, needed: 1 })
        ));
        assert_eq!(input.position(), 0);
        assert!(matches!(
            input.read_f32(),
            Err(Error::UnexpectedEndOfInput { .. })
        ));
        assert_eq!(input.read_i16().unwrap(), 1);
        assert!(matches!(
            input.read_i16(),
            Err(Error::UnexpectedEndOfInput { offset: 2, needed: 1 })
        ));

        let mut empty = BinaryInput::new(&[]);
        assert!(empty.read_u8().is_err());
        assert!(empty.read_bool().is_err());

        let mut truncated_varint = BinaryInput::new(&[0x80, 0x80]);
        assert!(truncated_varint.read_varint(true).is_err());
        assert_eq!(truncated_varint.position(), 0);

        let mut truncated_string = BinaryInput::new(&[5, b'a', b'b']);
        assert!(matches!(
            truncated_string.read_string(),
            Err(Error::UnexpectedEndOfInput { offset: 0, needed: 2 })
        ));
    }

    #[test]
    fn strings_decode_null_empty_and_multibyte() {
        // null, "", "hi", "é" (2-byte), "€" (3-byte)
        let bytes = [
            0u8, 1, 3, b'h', b'i', 3, 0xC3, 0xA9, 4, 0xE2, 0x82, 0xAC,
        ];
        let mut input = BinaryInput::new(&bytes);
        assert_eq!(input.read_string().unwrap(), None);
        assert_eq!(input.read_string().unwrap().as_deref(), Some(""));
        assert_eq!(input.read_string().unwrap().as_deref(), Some("hi"));
        assert_eq!(input.read_string().unwrap().as_deref(), Some("é"));
        assert_eq!(input.read_string().unwrap().as_deref(), Some("€"));
    }

    #[test]
    fn string_refs_are_one_based() {
        let strings = vec!["a".to_string(), "b".to_string()];
        let mut input = BinaryInput::new(&[0, 2, 3]);
        assert_eq!(input.read_string_ref(&strings).unwrap(), None);
        assert_eq!(input.read_string_ref(&strings).unwrap(), Some("b"));
        assert!(matches!(
            input.read_string_ref(&strings),
            Err(Error::MalformedSkeletonData { .. })
        ));
    }

    #[test]
    fn colors_and_floats_are_big_endian() {
        let mut bytes = vec![0xFF, 0x00, 0x80, 0xFF];
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        let mut input = BinaryInput::new(&bytes);
        let c = input.read_color().unwrap();
        assert_eq!(c[0], 1.0);
        assert_eq!(c[1], 0.0);
        assert!((c[2] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(input.read_f32().unwrap(), 1.5);
    }
}
