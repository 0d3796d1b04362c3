/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

const READ_CHUNK_SIZE: usize = 16384;

/// What one of the two sockets reported to the dispatcher.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Data(Bytes),
    Error(io::Error),
    Timeout,
    Closed,
}

/// Control or data socket, plain or TLS wrapped, behind one event surface.
pub(crate) enum FtpSocket {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl FtpSocket {
    pub(crate) fn new_plain(stream: TcpStream) -> io::Result<Self> {
        socket2::SockRef::from(&stream).set_keepalive(true)?;
        Ok(FtpSocket::Plain(stream))
    }

    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, FtpSocket::Tls(_))
    }

    /// Read the next chunk, honoring the uniform idle timeout.
    /// A zero timeout disables the deadline.
    pub(crate) async fn next_event(&mut self, timeout: Duration) -> SocketEvent {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let read = async {
            match self {
                FtpSocket::Plain(s) => s.read_buf(&mut buf).await,
                FtpSocket::Tls(s) => s.read_buf(&mut buf).await,
            }
        };
        let r = if timeout.is_zero() {
            read.await
        } else {
            match tokio::time::timeout(timeout, read).await {
                Ok(r) => r,
                Err(_) => return SocketEvent::Timeout,
            }
        };
        match r {
            Ok(0) => SocketEvent::Closed,
            Ok(_) => SocketEvent::Data(buf.freeze()),
            Err(e) => SocketEvent::Error(e),
        }
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            FtpSocket::Plain(s) => s.write_all(data).await,
            FtpSocket::Tls(s) => s.write_all(data).await,
        }
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            FtpSocket::Plain(s) => s.shutdown().await,
            FtpSocket::Tls(s) => s.shutdown().await,
        }
    }
}
