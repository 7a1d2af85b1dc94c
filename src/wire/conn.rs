use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

use crate::args::Arg;
use crate::error::{Error, Result};

use super::codec::{encode_command, RespCodec};
use super::value::RespValue;

/// Anything a wire connection can run over. In production this is a
/// `TcpStream`; tests substitute in-memory duplex pipes.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

const READ_CHUNK: usize = 4096;

/// A buffered connection speaking the backend's RESP dialect.
///
/// `send` only appends the encoded command to the output buffer; nothing is
/// written until `flush`. Replies are read one frame at a time through the
/// incremental decoder.
pub struct WireConn {
    io: Box<dyn Transport>,
    codec: RespCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl WireConn {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_transport(stream))
    }

    pub fn from_transport(io: impl Transport + 'static) -> Self {
        WireConn {
            io: Box::new(io),
            codec: RespCodec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
        }
    }

    /// Appends one encoded command to the output buffer.
    pub fn send(&mut self, name: &str, args: &[Arg]) -> Result<()> {
        encode_command(name, args, &mut self.write_buf)
    }

    /// Writes the output buffer to the transport.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.io.write_all_buf(&mut self.write_buf).await?;
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Reads the next reply frame.
    pub async fn receive(&mut self) -> Result<RespValue> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            let read = self.io.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(Error::ConnClosed);
            }
        }
    }

    /// Reads the next reply frame, giving up after `timeout`.
    pub async fn receive_timeout(&mut self, timeout: Duration) -> Result<RespValue> {
        match tokio::time::timeout(timeout, self.receive()).await {
            Ok(result) => result,
            Err(_) => Err(Error::from(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline exceeded",
            ))),
        }
    }

    /// Sends one command and reads its single reply. A convenience for code
    /// that already holds raw access and bypasses slot tracking.
    pub async fn round_trip(&mut self, name: &str, args: &[Arg]) -> Result<RespValue> {
        self.send(name, args)?;
        self.flush().await?;
        self.receive().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for WireConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireConn")
            .field("buffered_out", &self.write_buf.len())
            .field("buffered_in", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}
