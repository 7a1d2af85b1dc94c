use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::args::{Arg, ArgInfo};
use crate::error::{Error, Result};

use super::value::RespValue;

/// RESP2 framing. Decoding is incremental: a partial frame yields `None` and
/// consumes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let mut pos = 0usize;
        match parse_value(&src[..], &mut pos)? {
            Some(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = Error;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<()> {
        write_value(&item, dst);
        Ok(())
    }
}

/// Encodes one command as a RESP array of bulk strings into `dst`.
///
/// This is the only place argument values hit the wire; all conversions go
/// through the argument model so the canonical forms stay in one place.
pub fn encode_command(name: &str, args: &[Arg], dst: &mut BytesMut) -> Result<()> {
    write_header(b'*', (args.len() + 1) as i64, dst);
    write_bulk(name.as_bytes(), dst);
    for arg in args {
        let bytes = ArgInfo::parse(arg).to_redis_bytes()?;
        write_bulk(&bytes, dst);
    }
    Ok(())
}

fn write_value(value: &RespValue, dst: &mut BytesMut) {
    match value {
        RespValue::SimpleString(line) => write_line(b'+', line, dst),
        RespValue::Error(line) => write_line(b'-', line, dst),
        RespValue::Integer(number) => write_line(b':', number.to_string().as_bytes(), dst),
        RespValue::BulkString(data) => write_bulk(data, dst),
        RespValue::NullBulk => dst.put_slice(b"$-1\r\n"),
        RespValue::Array(values) => {
            write_header(b'*', values.len() as i64, dst);
            for value in values {
                write_value(value, dst);
            }
        }
        RespValue::NullArray => dst.put_slice(b"*-1\r\n"),
    }
}

fn write_line(prefix: u8, line: &[u8], dst: &mut BytesMut) {
    dst.put_u8(prefix);
    dst.put_slice(line);
    dst.put_slice(b"\r\n");
}

fn write_header(prefix: u8, len: i64, dst: &mut BytesMut) {
    dst.put_u8(prefix);
    dst.put_slice(len.to_string().as_bytes());
    dst.put_slice(b"\r\n");
}

fn write_bulk(data: &[u8], dst: &mut BytesMut) {
    write_header(b'$', data.len() as i64, dst);
    dst.put_slice(data);
    dst.put_slice(b"\r\n");
}

fn parse_value(src: &[u8], pos: &mut usize) -> Result<Option<RespValue>> {
    if *pos >= src.len() {
        return Ok(None);
    }
    let prefix = src[*pos];
    *pos += 1;

    match prefix {
        b'+' => Ok(read_line(src, pos)?.map(|line| RespValue::SimpleString(Bytes::copy_from_slice(line)))),
        b'-' => Ok(read_line(src, pos)?.map(|line| RespValue::Error(Bytes::copy_from_slice(line)))),
        b':' => {
            let line = match read_line(src, pos)? {
                Some(line) => line,
                None => return Ok(None),
            };
            let number = btoi::btoi(line).map_err(|_| Error::protocol("malformed integer frame"))?;
            Ok(Some(RespValue::Integer(number)))
        }
        b'$' => {
            let line = match read_line(src, pos)? {
                Some(line) => line,
                None => return Ok(None),
            };
            let len: i64 = btoi::btoi(line).map_err(|_| Error::protocol("malformed bulk length"))?;
            if len == -1 {
                return Ok(Some(RespValue::NullBulk));
            }
            if len < 0 {
                return Err(Error::protocol("negative bulk length"));
            }
            let len = len as usize;
            if src.len() < *pos + len + 2 {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&src[*pos..*pos + len]);
            if &src[*pos + len..*pos + len + 2] != b"\r\n" {
                return Err(Error::protocol("bulk frame missing terminator"));
            }
            *pos += len + 2;
            Ok(Some(RespValue::BulkString(data)))
        }
        b'*' => {
            let line = match read_line(src, pos)? {
                Some(line) => line,
                None => return Ok(None),
            };
            let len: i64 = btoi::btoi(line).map_err(|_| Error::protocol("malformed array length"))?;
            if len == -1 {
                return Ok(Some(RespValue::NullArray));
            }
            if len < 0 {
                return Err(Error::protocol("negative array length"));
            }
            let mut values = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse_value(src, pos)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            Ok(Some(RespValue::Array(values)))
        }
        other => Err(Error::Protocol(format!(
            "unknown RESP frame prefix {:#04x}",
            other
        ))),
    }
}

fn read_line<'a>(src: &'a [u8], pos: &mut usize) -> Result<Option<&'a [u8]>> {
    let tail = &src[*pos..];
    match tail.windows(2).position(|window| window == b"\r\n") {
        Some(end) => {
            let line = &tail[..end];
            *pos += end + 2;
            Ok(Some(line))
        }
        None => Ok(None),
    }
}
