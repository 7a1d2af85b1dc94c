use bytes::Bytes;

use crate::error::{Error, Result};

/// A decoded RESP2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Bytes),
    NullBulk,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    pub fn simple<T: AsRef<[u8]>>(value: T) -> Self {
        RespValue::SimpleString(Bytes::copy_from_slice(value.as_ref()))
    }

    pub fn error<T: AsRef<[u8]>>(value: T) -> Self {
        RespValue::Error(Bytes::copy_from_slice(value.as_ref()))
    }

    pub fn bulk<T: AsRef<[u8]>>(value: T) -> Self {
        RespValue::BulkString(Bytes::copy_from_slice(value.as_ref()))
    }

    pub fn ok() -> Self {
        RespValue::SimpleString(Bytes::from_static(b"OK"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, RespValue::NullBulk | RespValue::NullArray)
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RespValue::SimpleString(b) | RespValue::BulkString(b) | RespValue::Error(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// The reply interpreted as an integer: either an integer frame or a bulk
    /// string holding base-10 digits. Anything else is a protocol violation
    /// for the call sites that use this (existence probes, counters).
    pub fn expect_integer(&self) -> Result<i64> {
        match self {
            RespValue::Integer(value) => Ok(*value),
            RespValue::BulkString(b) | RespValue::SimpleString(b) => {
                btoi::btoi(b).map_err(|_| Error::protocol("reply is not an integer"))
            }
            RespValue::Error(msg) => Err(Error::Protocol(format!(
                "backend error reply: {}",
                String::from_utf8_lossy(msg)
            ))),
            other => Err(Error::Protocol(format!(
                "expected integer reply, got {other:?}"
            ))),
        }
    }
}
