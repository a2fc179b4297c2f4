use crate::error::{Result, ToneError};
use crate::{HEADER_END, HEADER_START, TEXT_HEADER_SIZE};

// Header layout (integers little-endian)
//
//   0xFE | type | ... | 0xFF
//
// text: type = 0x00, raw size (u32)
// file: type = 0x01, filename length (u16), filename, extension length (u16),
//       extension, raw size (u32)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    File,
}

impl MessageType {
    pub fn to_u8(self) -> u8 {
        match self {
            MessageType::Text => 0x00,
            MessageType::File => 0x01,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(MessageType::Text),
            0x01 => Some(MessageType::File),
            _ => None,
        }
    }
}

/// Name of a transmitted file, split the way the header carries it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub filename: String,
    pub extension: String,
}

impl FileMeta {
    pub fn new(filename: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            extension: extension.into(),
        }
    }

    /// `filename.extension`, or just the filename when there is no extension
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, self.extension)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub raw_size: u32,
    pub file: Option<FileMeta>,
}

impl Header {
    pub fn text(raw_size: u32) -> Self {
        Self {
            message_type: MessageType::Text,
            raw_size,
            file: None,
        }
    }

    pub fn file(meta: FileMeta, raw_size: u32) -> Self {
        Self {
            message_type: MessageType::File,
            raw_size,
            file: Some(meta),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_header(self.message_type, self.raw_size as usize, self.file.as_ref())
    }
}

/// Build the delimiter-wrapped header for a payload of `raw_len` bytes
pub fn encode_header(
    message_type: MessageType,
    raw_len: usize,
    file_meta: Option<&FileMeta>,
) -> Result<Vec<u8>> {
    let raw_size = u32::try_from(raw_len).map_err(|_| {
        ToneError::InvalidArgument(format!(
            "payload of {} bytes exceeds the 32-bit size field",
            raw_len
        ))
    })?;

    let mut header = Vec::with_capacity(TEXT_HEADER_SIZE);
    header.push(HEADER_START);
    header.push(message_type.to_u8());

    match (message_type, file_meta) {
        (MessageType::Text, None) => {}
        (MessageType::Text, Some(_)) => {
            return Err(ToneError::InvalidArgument(
                "text messages carry no file metadata".into(),
            ));
        }
        (MessageType::File, None) => {
            return Err(ToneError::InvalidArgument(
                "file messages require a filename and extension".into(),
            ));
        }
        (MessageType::File, Some(meta)) => {
            write_field(&mut header, "filename", meta.filename.as_bytes())?;
            write_field(&mut header, "extension", meta.extension.as_bytes())?;
        }
    }

    header.extend_from_slice(&raw_size.to_le_bytes());
    header.push(HEADER_END);
    Ok(header)
}

fn write_field(out: &mut Vec<u8>, name: &str, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        ToneError::InvalidArgument(format!(
            "{} is {} bytes, limit is {}",
            name,
            bytes.len(),
            u16::MAX
        ))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Parse a header starting at `offset`
///
/// Returns the header and the offset just past its end delimiter; any bytes
/// from there on are raw payload.
pub fn decode_header(bytes: &[u8], offset: usize) -> Result<(Header, usize)> {
    match parse(bytes, offset)? {
        Parsed::Complete(header, end) => Ok((header, end)),
        Parsed::Incomplete(field) => Err(ToneError::MalformedHeader(format!(
            "truncated before {}",
            field
        ))),
    }
}

/// Like `decode_header` at offset 0, but a buffer that is a valid prefix of a
/// header yields `Ok(None)` so the caller can wait for more bytes
pub(crate) fn try_decode_header(bytes: &[u8]) -> Result<Option<(Header, usize)>> {
    match parse(bytes, 0)? {
        Parsed::Complete(header, end) => Ok(Some((header, end))),
        Parsed::Incomplete(_) => Ok(None),
    }
}

enum Parsed {
    Complete(Header, usize),
    Incomplete(&'static str),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn parse(bytes: &[u8], offset: usize) -> Result<Parsed> {
    let mut reader = Reader { bytes, pos: offset };

    let Some(start) = reader.u8() else {
        return Ok(Parsed::Incomplete("start delimiter"));
    };
    if start != HEADER_START {
        return Err(ToneError::MalformedHeader(format!(
            "expected start delimiter {:#04x} at offset {}, found {:#04x}",
            HEADER_START, offset, start
        )));
    }

    let Some(type_byte) = reader.u8() else {
        return Ok(Parsed::Incomplete("message type"));
    };
    let message_type = MessageType::from_u8(type_byte).ok_or_else(|| {
        ToneError::MalformedHeader(format!("unknown message type {:#04x}", type_byte))
    })?;

    let file = match message_type {
        MessageType::Text => None,
        MessageType::File => {
            let Some(filename) = read_field(&mut reader, "filename")? else {
                return Ok(Parsed::Incomplete("filename"));
            };
            let Some(extension) = read_field(&mut reader, "extension")? else {
                return Ok(Parsed::Incomplete("extension"));
            };
            Some(FileMeta { filename, extension })
        }
    };

    let Some(raw_size) = reader.u32() else {
        return Ok(Parsed::Incomplete("raw data size"));
    };

    let Some(end) = reader.u8() else {
        return Ok(Parsed::Incomplete("end delimiter"));
    };
    if end != HEADER_END {
        return Err(ToneError::MalformedHeader(format!(
            "expected end delimiter {:#04x} at offset {}, found {:#04x}",
            HEADER_END,
            reader.pos - 1,
            end
        )));
    }

    let header = Header {
        message_type,
        raw_size,
        file,
    };
    Ok(Parsed::Complete(header, reader.pos))
}

fn read_field(reader: &mut Reader<'_>, name: &str) -> Result<Option<String>> {
    let Some(len) = reader.u16() else {
        return Ok(None);
    };
    let Some(bytes) = reader.take(len as usize) else {
        return Ok(None);
    };
    String::from_utf8(bytes.to_vec())
        .map(Some)
        .map_err(|_| ToneError::MalformedHeader(format!("{} is not valid UTF-8", name)))
}
