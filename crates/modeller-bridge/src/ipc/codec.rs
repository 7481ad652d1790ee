//! Primitive wire encoding shared by both ends of the bridge.
//!
//! Format: fixed width 4-byte integers and floats in native byte order,
//! strings as a 4-byte signed length followed by that many UTF-8 bytes.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Upper bound on a single string field (64MB).
pub const MAX_STRING_LEN: usize = 64 * 1024 * 1024;

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(writer: &mut W, value: f32) -> Result<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let len = i32::try_from(value.len()).map_err(|_| {
        Error::MalformedFrame(format!("string of {} bytes is too long", value.len()))
    })?;
    write_i32(writer, len)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_ne_bytes(bytes))
}

pub fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(f32::from_ne_bytes(bytes))
}

/// Read a length-prefixed UTF-8 string.
///
/// A negative or absurdly large length fails before anything is allocated.
pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(Error::MalformedFrame(format!(
            "received a negative length ({len}) for a string coming across the bridge"
        )));
    }
    let len = len as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::MalformedFrame(format!(
            "string field too large: {len} bytes"
        )));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| Error::MalformedFrame(format!("string is not valid UTF-8: {e}")))
}

/// Read the leading signal identifier of a frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// A stream ending inside the identifier is an IO error.
pub fn read_signal_id<R: Read>(reader: &mut R) -> Result<Option<i32>> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        match reader.read(&mut bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a signal identifier",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(i32::from_ne_bytes(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_string_layout() {
        let mut buf = Vec::new();
        write_string(&mut buf, "héllo").unwrap();

        assert_eq!(&buf[..4], &6i32.to_ne_bytes());
        assert_eq!(&buf[4..], "héllo".as_bytes());

        let decoded = read_string(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, "héllo");
    }

    #[test]
    fn test_empty_string() {
        let mut buf = Vec::new();
        write_string(&mut buf, "").unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(read_string(&mut Cursor::new(buf)).unwrap(), "");
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let buf = (-1i32).to_ne_bytes().to_vec();
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)), "got {err:?}");
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let buf = i32::MAX.to_ne_bytes().to_vec();
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_truncated_string_is_io_error() {
        let mut buf = 10i32.to_ne_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = 2i32.to_ne_bytes().to_vec();
        buf.extend_from_slice(&[0xff, 0xfe]);
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_float() {
        let mut buf = Vec::new();
        write_f32(&mut buf, 0.25).unwrap();
        assert_eq!(read_f32(&mut Cursor::new(buf)).unwrap(), 0.25);
    }

    #[test]
    fn test_signal_id_eof() {
        assert!(read_signal_id(&mut Cursor::new(Vec::new())).unwrap().is_none());

        let err = read_signal_id(&mut Cursor::new(vec![1u8, 0])).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let id = read_signal_id(&mut Cursor::new(7i32.to_ne_bytes().to_vec())).unwrap();
        assert_eq!(id, Some(7));
    }
}
