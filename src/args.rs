//! Heterogeneous command arguments and their canonical conversions.
//!
//! Callers hand the shim whatever a Redis client library would accept:
//! strings, raw bytes, integers, floats, booleans or nil. `Arg` is the value
//! model; [`ArgInfo`] classifies one argument and offers the conversions the
//! rewrite logic needs. A one-level adapter protocol is recognised: an
//! `Arg::Wrapped` exposes an inner argument and the unwrap depth is counted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Bytes(Bytes),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Nil,
    /// Adapter protocol: a value that exposes an inner argument.
    Wrapped(Box<Arg>),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        Arg::Uint(value)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Uint(u64::from(value))
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::Uint(value as u64)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

/// Classification of one argument, produced by [`ArgInfo::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Bytes,
    Int,
    Uint,
    Float,
    Bool,
    Nil,
}

/// A borrowed view of an [`Arg`] with its adapter wrapping peeled off.
#[derive(Debug, Clone, Copy)]
pub struct ArgInfo<'a> {
    arg: &'a Arg,
    unwrapped: &'a Arg,
    kind: ArgKind,
    wrapping_level: usize,
}

impl<'a> ArgInfo<'a> {
    pub fn parse(arg: &'a Arg) -> Self {
        let mut unwrapped = arg;
        let mut wrapping_level = 0;
        while let Arg::Wrapped(inner) = unwrapped {
            unwrapped = inner.as_ref();
            wrapping_level += 1;
        }
        let kind = match unwrapped {
            Arg::Str(_) => ArgKind::Str,
            Arg::Bytes(_) => ArgKind::Bytes,
            Arg::Int(_) => ArgKind::Int,
            Arg::Uint(_) => ArgKind::Uint,
            Arg::Float(_) => ArgKind::Float,
            Arg::Bool(_) => ArgKind::Bool,
            Arg::Nil => ArgKind::Nil,
            Arg::Wrapped(_) => unreachable!("wrapping fully unwound"),
        };
        ArgInfo {
            arg,
            unwrapped,
            kind,
            wrapping_level,
        }
    }

    pub fn arg(&self) -> &'a Arg {
        self.arg
    }

    pub fn unwrapped(&self) -> &'a Arg {
        self.unwrapped
    }

    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    pub fn wrapping_level(&self) -> usize {
        self.wrapping_level
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapping_level > 0
    }

    pub fn is_string_like(&self) -> bool {
        matches!(self.kind, ArgKind::Str | ArgKind::Bytes)
    }

    /// The raw byte form of a string-like argument. Any other kind yields an
    /// empty value; key extraction relies on this to skip non-key arguments.
    pub fn as_simple_string(&self) -> Bytes {
        match self.unwrapped {
            Arg::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            Arg::Bytes(b) => b.clone(),
            _ => Bytes::new(),
        }
    }

    /// Equality against whichever of `text` / `bytes` matches the underlying
    /// storage of the argument.
    pub fn equal_either(&self, text: &str, bytes: &[u8]) -> bool {
        match self.unwrapped {
            Arg::Str(s) => s == text,
            Arg::Bytes(b) => b.as_ref() == bytes,
            _ => false,
        }
    }

    /// Case-insensitive variant of [`ArgInfo::equal_either`]. RESP modifier
    /// tokens are ASCII, so ASCII folding is sufficient.
    pub fn equal_fold_either(&self, text: &str, bytes: &[u8]) -> bool {
        match self.unwrapped {
            Arg::Str(s) => s.eq_ignore_ascii_case(text),
            Arg::Bytes(b) => b.eq_ignore_ascii_case(bytes),
            _ => false,
        }
    }

    /// Formats the argument the way the wire encoder would: base-10 for
    /// integers, shortest decimal for floats, `1`/`0` for booleans, the
    /// empty string for nil.
    pub fn to_redis_string(&self) -> Result<String> {
        match self.unwrapped {
            Arg::Str(s) => Ok(s.clone()),
            Arg::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            Arg::Int(v) => Ok(v.to_string()),
            Arg::Uint(v) => Ok(v.to_string()),
            Arg::Float(v) => Ok(v.to_string()),
            Arg::Bool(true) => Ok("1".to_owned()),
            Arg::Bool(false) => Ok("0".to_owned()),
            Arg::Nil => Ok(String::new()),
            Arg::Wrapped(_) => Err(Error::InvalidTypeForOperation),
        }
    }

    /// Byte-exact sibling of [`ArgInfo::to_redis_string`].
    pub fn to_redis_bytes(&self) -> Result<Bytes> {
        match self.unwrapped {
            Arg::Bytes(b) => Ok(b.clone()),
            _ => {
                let mut buf = BytesMut::new();
                self.append_redis_bytes(&mut buf)?;
                Ok(buf.freeze())
            }
        }
    }

    /// Appends the wire form of the argument to `buf`.
    pub fn append_redis_bytes(&self, buf: &mut BytesMut) -> Result<()> {
        match self.unwrapped {
            Arg::Str(s) => buf.put_slice(s.as_bytes()),
            Arg::Bytes(b) => buf.put_slice(b),
            Arg::Int(v) => buf.put_slice(v.to_string().as_bytes()),
            Arg::Uint(v) => buf.put_slice(v.to_string().as_bytes()),
            Arg::Float(v) => buf.put_slice(v.to_string().as_bytes()),
            Arg::Bool(true) => buf.put_u8(b'1'),
            Arg::Bool(false) => buf.put_u8(b'0'),
            Arg::Nil => {}
            Arg::Wrapped(_) => return Err(Error::InvalidTypeForOperation),
        }
        Ok(())
    }

    /// The argument as a signed integer. Nil has no integer form.
    pub fn to_int(&self) -> Result<i64> {
        match self.unwrapped {
            Arg::Str(s) => s.parse().map_err(|_| Error::InvalidArgumentType),
            Arg::Bytes(b) => btoi::btoi(b).map_err(|_| Error::InvalidArgumentType),
            Arg::Int(v) => Ok(*v),
            Arg::Uint(v) => Ok(*v as i64),
            Arg::Float(v) => Ok(*v as i64),
            Arg::Bool(true) => Ok(1),
            Arg::Bool(false) => Ok(0),
            Arg::Nil | Arg::Wrapped(_) => Err(Error::InvalidTypeForOperation),
        }
    }

    /// The argument as an unsigned integer. Nil has no integer form.
    pub fn to_uint(&self) -> Result<u64> {
        match self.unwrapped {
            Arg::Str(s) => s.parse().map_err(|_| Error::InvalidArgumentType),
            Arg::Bytes(b) => btoi::btou(b).map_err(|_| Error::InvalidArgumentType),
            Arg::Int(v) => Ok(*v as u64),
            Arg::Uint(v) => Ok(*v),
            Arg::Float(v) => Ok(*v as u64),
            Arg::Bool(true) => Ok(1),
            Arg::Bool(false) => Ok(0),
            Arg::Nil | Arg::Wrapped(_) => Err(Error::InvalidTypeForOperation),
        }
    }
}

/// Projects the raw byte form of every argument in `args`, appending to `out`.
pub fn append_as_simple_strings(out: &mut Vec<Bytes>, args: &[&Arg]) {
    out.reserve(args.len());
    for arg in args {
        out.push(ArgInfo::parse(arg).as_simple_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_scalars() {
        assert_eq!(ArgInfo::parse(&Arg::from("x")).kind(), ArgKind::Str);
        assert_eq!(ArgInfo::parse(&Arg::from(7i64)).kind(), ArgKind::Int);
        assert_eq!(ArgInfo::parse(&Arg::from(7u64)).kind(), ArgKind::Uint);
        assert_eq!(ArgInfo::parse(&Arg::Nil).kind(), ArgKind::Nil);
    }

    #[test]
    fn counts_wrapping_depth() {
        let wrapped = Arg::Wrapped(Box::new(Arg::Wrapped(Box::new(Arg::from("inner")))));
        let info = ArgInfo::parse(&wrapped);
        assert_eq!(info.wrapping_level(), 2);
        assert!(info.is_wrapped());
        assert_eq!(info.kind(), ArgKind::Str);
        assert_eq!(info.as_simple_string().as_ref(), b"inner");
    }

    #[test]
    fn simple_string_is_empty_for_non_string_kinds() {
        assert!(ArgInfo::parse(&Arg::from(42i64)).as_simple_string().is_empty());
        assert!(ArgInfo::parse(&Arg::Nil).as_simple_string().is_empty());
    }

    #[test]
    fn fold_equality_matches_modifier_tokens() {
        let arg = Arg::from("ex");
        let info = ArgInfo::parse(&arg);
        assert!(info.equal_fold_either("EX", b"EX"));
        assert!(!info.equal_either("EX", b"EX"));

        let arg = Arg::from(&b"Px"[..]);
        assert!(ArgInfo::parse(&arg).equal_fold_either("PX", b"PX"));
    }

    #[test]
    fn converts_to_redis_string_forms() {
        assert_eq!(ArgInfo::parse(&Arg::from(10i64)).to_redis_string().unwrap(), "10");
        assert_eq!(ArgInfo::parse(&Arg::from(1.5f64)).to_redis_string().unwrap(), "1.5");
        assert_eq!(ArgInfo::parse(&Arg::from(true)).to_redis_string().unwrap(), "1");
        assert_eq!(ArgInfo::parse(&Arg::Nil).to_redis_string().unwrap(), "");
    }

    #[test]
    fn integer_conversion_rejects_nil() {
        assert!(matches!(
            ArgInfo::parse(&Arg::Nil).to_int(),
            Err(Error::InvalidTypeForOperation)
        ));
        assert_eq!(ArgInfo::parse(&Arg::from("123")).to_int().unwrap(), 123);
        assert_eq!(ArgInfo::parse(&Arg::from(&b"-4"[..])).to_int().unwrap(), -4);
    }
}
