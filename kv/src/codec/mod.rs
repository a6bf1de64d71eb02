//! Length-prefixed variable-integer framing of [`Record`] values over a
//! byte stream.
//!
//! Each frame is `uvarint(len) || body`, where `body` is a small
//! tag-length-value encoding of the record's fields. The TLV shape lets a
//! reader skip fields it doesn't recognise instead of failing.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{CResult, Error};
use crate::record::{Record, RecordKind};

const TAG_KIND: u8 = 1;
const TAG_TXID: u8 = 2;
const TAG_KEY: u8 = 3;
const TAG_VALUE: u8 = 4;

fn write_uvarint<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            w.write_u8(byte)?;
            return Ok(());
        }
        w.write_u8(byte | 0x80)?;
    }
}

fn read_uvarint<R: Read>(r: &mut R) -> CResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        if shift >= 64 {
            return Err(Error::Codec("varint too long".into()));
        }
        let byte = match r.read_u8() {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && shift == 0 => {
                return Err(Error::Codec("eof at frame boundary".into()));
            }
            Err(e) => return Err(eof_is_truncation(e)),
        };
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

fn eof_is_truncation(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Codec("truncated frame".into())
    } else {
        Error::Io(e)
    }
}

fn write_field<W: Write>(w: &mut W, tag: u8, payload: &[u8]) -> io::Result<()> {
    w.write_u8(tag)?;
    write_uvarint(w, payload.len() as u64)?;
    w.write_all(payload)
}

/// Serialises `record` into an in-memory buffer, then appends the
/// length-prefixed frame to `sink` in one effective write so that no
/// partial frame is ever observable by a concurrent reader.
pub fn write_record<W: Write>(sink: &mut W, record: &Record) -> CResult<()> {
    let mut body = Vec::with_capacity(32);
    write_field(&mut body, TAG_KIND, &[record.kind.to_wire()])?;

    let mut txid_buf = Vec::with_capacity(8);
    txid_buf.write_i64::<BigEndian>(record.txid)?;
    write_field(&mut body, TAG_TXID, &txid_buf)?;

    if !record.key.is_empty() {
        write_field(&mut body, TAG_KEY, record.key.as_bytes())?;
    }
    if !record.value.is_empty() {
        write_field(&mut body, TAG_VALUE, record.value.as_bytes())?;
    }

    let mut frame = Vec::with_capacity(body.len() + 4);
    write_uvarint(&mut frame, body.len() as u64)?;
    frame.extend_from_slice(&body);

    sink.write_all(&frame)?;
    Ok(())
}

/// Reads one length-prefixed frame from `source` and decodes it into a
/// [`Record`]. Returns `Ok(None)` on a clean end-of-stream (i.e. EOF exactly
/// between frames); any other truncation, malformed varint, or unknown
/// `kind` is an error.
pub fn read_record<R: Read>(source: &mut R) -> CResult<Option<Record>> {
    let len = match read_uvarint(source) {
        Ok(len) => len,
        Err(Error::Codec(msg)) if msg == "eof at frame boundary" => return Ok(None),
        Err(e) => return Err(e),
    };

    if len == 0 {
        return Err(Error::Codec("zero-length frame".into()));
    }

    let mut body = vec![0u8; len as usize];
    source.read_exact(&mut body).map_err(eof_is_truncation)?;
    let mut cursor = io::Cursor::new(body);

    let mut kind: Option<RecordKind> = None;
    let mut txid: i64 = 0;
    let mut key = String::new();
    let mut value = String::new();

    while cursor.position() < cursor.get_ref().len() as u64 {
        let tag = cursor.read_u8().map_err(eof_is_truncation)?;
        let field_len = read_uvarint(&mut cursor)?;
        let start = cursor.position() as usize;
        let end = start
            .checked_add(field_len as usize)
            .filter(|&e| e <= cursor.get_ref().len())
            .ok_or_else(|| Error::Codec("field length exceeds frame".into()))?;
        let payload = &cursor.get_ref()[start..end];

        match tag {
            TAG_KIND => {
                let b = *payload
                    .first()
                    .ok_or_else(|| Error::Codec("empty kind field".into()))?;
                kind = Some(
                    RecordKind::from_wire(b)
                        .ok_or_else(|| Error::Codec(format!("unknown record kind {}", b)))?,
                );
            }
            TAG_TXID => {
                let mut c = io::Cursor::new(payload);
                txid = c
                    .read_i64::<BigEndian>()
                    .map_err(|_| Error::Codec("malformed txid field".into()))?;
            }
            TAG_KEY => {
                key = String::from_utf8(payload.to_vec())
                    .map_err(|_| Error::Codec("key is not valid utf-8".into()))?;
            }
            TAG_VALUE => {
                value = String::from_utf8(payload.to_vec())
                    .map_err(|_| Error::Codec("value is not valid utf-8".into()))?;
            }
            _ => {
                log::warn!("skipping unknown record field tag {}", tag);
            }
        }

        cursor.set_position(end as u64);
    }

    let kind = kind.ok_or_else(|| Error::Codec("record missing kind field".into()))?;
    Ok(Some(Record { kind, txid, key, value }))
}
