/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::FtpClientConfig;
use crate::context::FtpContext;
use crate::error::FtpError;
use crate::response::FtpResponse;
use crate::socket::{FtpSocket, SocketEvent};
use crate::task::{Signal, Task, TaskHandler};
use crate::tls::FtpTlsConfig;
use crate::transfer;

/// Async FTP/FTPS client over a serialized control-channel dispatcher.
///
/// One operation may be outstanding at a time; each operation suspends
/// its caller until the server settles it.
pub struct FtpClient {
    ctx: FtpContext,
    greeting: FtpResponse,
}

impl FtpClient {
    /// Connect to the server and await the `220` service-ready greeting.
    pub async fn connect(
        host: &str,
        port: u16,
        config: FtpClientConfig,
    ) -> Result<Self, FtpError> {
        let dial = TcpStream::connect((host, port));
        let stream = if config.timeout.is_zero() {
            dial.await.map_err(FtpError::Transport)?
        } else {
            match tokio::time::timeout(config.timeout, dial).await {
                Ok(r) => r.map_err(FtpError::Transport)?,
                Err(_) => return Err(FtpError::Timeout),
            }
        };
        let socket = FtpSocket::new_plain(stream).map_err(FtpError::Transport)?;

        let mut ctx = FtpContext::new(socket, host.to_string(), config);
        let greeting = ctx.dispatch(None, GreetingHandler).await?;
        Ok(FtpClient { ctx, greeting })
    }

    /// The greeting the server opened the session with.
    pub fn greeting(&self) -> &FtpResponse {
        &self.greeting
    }

    pub fn closed(&self) -> bool {
        self.ctx.closed()
    }

    /// Tear down both connections. Idempotent.
    pub fn close(&mut self) {
        self.ctx.close();
    }

    /// Send a command and await its final reply. 4xx/5xx replies reject
    /// with [`FtpError::Protocol`]; unsolicited 1xx replies are waited
    /// out.
    pub async fn send(&mut self, command: &str) -> Result<FtpResponse, FtpError> {
        self.ctx
            .dispatch(Some(command), SendHandler { ignore_errors: false })
            .await
    }

    /// Like [`send`](Self::send), but a 4xx/5xx reply resolves with the
    /// reply instead of rejecting. Transport and timeout errors still
    /// fail.
    pub async fn send_ignore_errors(&mut self, command: &str) -> Result<FtpResponse, FtpError> {
        self.ctx
            .dispatch(Some(command), SendHandler { ignore_errors: true })
            .await
    }

    /// Upgrade the control connection with `AUTH TLS`. The options are
    /// kept for securing data connections with the same session.
    pub async fn use_tls(&mut self, config: FtpTlsConfig) -> Result<FtpResponse, FtpError> {
        self.ctx
            .dispatch(Some("AUTH TLS"), TlsHandler { config: Some(config) })
            .await
    }

    /// Log in with `USER`/`PASS`. The password never reaches the log
    /// sink in clear text.
    pub async fn login(&mut self, user: &str, pass: &str) -> Result<FtpResponse, FtpError> {
        let cmd = format!("USER {user}");
        let rsp = self
            .ctx
            .dispatch(Some(&cmd), SendHandler { ignore_errors: false })
            .await?;
        match rsp.code {
            331 => {
                let cmd = format!("PASS {pass}");
                self.ctx
                    .dispatch(Some(&cmd), SendHandler { ignore_errors: false })
                    .await
            }
            200..=299 => Ok(rsp),
            _ => Err(FtpError::Protocol(rsp)),
        }
    }

    /// Apply the settings most transfers expect: binary type and file
    /// structure, plus `PBSZ 0`/`PROT P` on secured sessions. The last
    /// two ignore protocol errors, old servers reject them.
    pub async fn use_default_settings(&mut self) -> Result<(), FtpError> {
        self.send("TYPE I").await?;
        self.send("STRU F").await?;
        if self.ctx.is_tls() {
            self.send_ignore_errors("PBSZ 0").await?;
            self.send_ignore_errors("PROT P").await?;
        }
        Ok(())
    }

    /// Run `LIST` over a passive data connection and hand the raw
    /// listing text to `parse`.
    pub async fn list<T, F>(&mut self, path: Option<&str>, parse: F) -> Result<T, FtpError>
    where
        F: FnOnce(&str) -> T,
    {
        transfer::prepare_data_connection(&mut self.ctx).await?;

        let cmd = match path {
            Some(path) => format!("LIST {path}"),
            None => "LIST".to_string(),
        };
        let handler = ListHandler {
            buf: Vec::new(),
            end_seen: false,
        };
        let r = self.ctx.dispatch(Some(&cmd), handler).await;
        self.ctx.release_data_socket();
        let (raw, end_seen) = r?;

        // the end reply may trail the data EOF
        if !end_seen {
            self.ctx.absorb_end_reply().await;
        }

        let text = String::from_utf8_lossy(&raw);
        Ok(parse(&text))
    }

    /// Store `src` under `name` via `STOR`. Settles on the `226` end
    /// reply; the data socket closing is not by itself success.
    pub async fn upload<R>(&mut self, src: &mut R, name: &str) -> Result<FtpResponse, FtpError>
    where
        R: AsyncRead + Unpin + Send,
    {
        transfer::prepare_data_connection(&mut self.ctx).await?;

        let cmd = format!("STOR {name}");
        let r = self
            .ctx
            .dispatch(Some(&cmd), StoreHandler { src, started: false })
            .await;
        self.ctx.release_data_socket();
        r
    }

    /// Retrieve `name` into `dst` via `RETR`, resuming at `start_at`
    /// when non-zero (`REST`, then `RETR` once the server acknowledges
    /// the offset with `350`).
    pub async fn download<W>(
        &mut self,
        dst: &mut W,
        name: &str,
        start_at: u64,
    ) -> Result<FtpResponse, FtpError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        transfer::prepare_data_connection(&mut self.ctx).await?;

        let cmd = if start_at > 0 {
            format!("REST {start_at}")
        } else {
            format!("RETR {name}")
        };
        let handler = RetrieveHandler {
            dst,
            name: name.to_string(),
        };
        let r = self.ctx.dispatch(Some(&cmd), handler).await;
        self.ctx.release_data_socket();
        r
    }

    /// Send `QUIT` and close the connection regardless of the outcome.
    pub async fn quit(&mut self) -> Result<(), FtpError> {
        let r = self.send("QUIT").await;
        self.close();
        r.map(|_| ())
    }
}

struct GreetingHandler;

#[async_trait]
impl TaskHandler for GreetingHandler {
    type Output = FtpResponse;

    async fn handle(
        &mut self,
        _ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<FtpResponse>,
    ) {
        match signal {
            Signal::Response(rsp) if (200..300).contains(&rsp.code) => task.resolve(rsp),
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            Signal::Error(e) => task.reject(e),
            Signal::DataChunk(_) | Signal::DataEnd => {}
        }
    }
}

struct SendHandler {
    ignore_errors: bool,
}

#[async_trait]
impl TaskHandler for SendHandler {
    type Output = FtpResponse;

    async fn handle(
        &mut self,
        _ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<FtpResponse>,
    ) {
        match signal {
            Signal::Response(rsp) if rsp.is_failure() && self.ignore_errors => task.resolve(rsp),
            Signal::Response(rsp) => task.classify(rsp),
            Signal::Error(e) => task.reject(e),
            Signal::DataChunk(_) | Signal::DataEnd => {}
        }
    }
}

struct TlsHandler {
    config: Option<FtpTlsConfig>,
}

#[async_trait]
impl TaskHandler for TlsHandler {
    type Output = FtpResponse;

    async fn handle(
        &mut self,
        ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<FtpResponse>,
    ) {
        match signal {
            Signal::Response(rsp) if rsp.code == 200 || rsp.code == 234 => {
                let Some(config) = self.config.take() else {
                    return;
                };
                match ctx.upgrade_control_tls(&config).await {
                    Ok(()) => task.resolve(rsp),
                    Err(e) => task.reject(e),
                }
            }
            Signal::Response(rsp) if rsp.is_preliminary() => {}
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            Signal::Error(e) => task.reject(e),
            Signal::DataChunk(_) | Signal::DataEnd => {}
        }
    }
}

struct ListHandler {
    buf: Vec<u8>,
    end_seen: bool,
}

#[async_trait]
impl TaskHandler for ListHandler {
    type Output = (Vec<u8>, bool);

    async fn handle(
        &mut self,
        _ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<(Vec<u8>, bool)>,
    ) {
        match signal {
            Signal::DataChunk(bytes) => self.buf.extend_from_slice(&bytes),
            // the listing is complete when the data connection ends; a
            // 226 is tolerated on either side of that
            Signal::DataEnd => task.resolve((std::mem::take(&mut self.buf), self.end_seen)),
            Signal::Response(rsp) if rsp.is_failure() => task.reject(FtpError::Protocol(rsp)),
            Signal::Response(rsp) => {
                if !rsp.is_preliminary() {
                    self.end_seen = true;
                }
            }
            Signal::Error(e) => task.reject(e),
        }
    }
}

struct StoreHandler<'a, R> {
    src: &'a mut R,
    started: bool,
}

#[async_trait]
impl<'a, R> TaskHandler for StoreHandler<'a, R>
where
    R: AsyncRead + Unpin + Send,
{
    type Output = FtpResponse;

    async fn handle(
        &mut self,
        ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<FtpResponse>,
    ) {
        match signal {
            Signal::Response(rsp) if rsp.is_preliminary() => {
                if self.started {
                    return;
                }
                self.started = true;
                if let Err(e) = ctx.pump_upload(&mut *self.src).await {
                    task.reject(e);
                }
            }
            Signal::Response(rsp) if rsp.is_positive() => task.resolve(rsp),
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            // the server sends nothing on the data connection of a store,
            // and its close alone is not success
            Signal::DataChunk(_) | Signal::DataEnd => {}
            Signal::Error(e) => task.reject(e),
        }
    }
}

struct RetrieveHandler<'a, W> {
    dst: &'a mut W,
    name: String,
}

impl<'a, W> RetrieveHandler<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Late chunks may still sit in the data connection when the end
    /// reply wins the race; deliver them before settling.
    async fn drain_data(&mut self, ctx: &mut FtpContext) -> Result<(), FtpError> {
        let wait = ctx.config().transfer.end_wait_timeout;
        loop {
            match ctx.next_data_event(wait).await {
                Some(SocketEvent::Data(bytes)) => self
                    .dst
                    .write_all(&bytes)
                    .await
                    .map_err(FtpError::Transport)?,
                Some(SocketEvent::Error(e)) => return Err(FtpError::Transport(e)),
                Some(SocketEvent::Closed) | Some(SocketEvent::Timeout) | None => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl<'a, W> TaskHandler for RetrieveHandler<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Output = FtpResponse;

    async fn handle(
        &mut self,
        ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<FtpResponse>,
    ) {
        match signal {
            Signal::Response(rsp) if rsp.code == 350 => {
                let cmd = format!("RETR {}", self.name);
                if let Err(e) = ctx.send_command(&cmd).await {
                    task.reject(e);
                }
            }
            Signal::Response(rsp) if rsp.is_preliminary() => {}
            Signal::Response(rsp) if rsp.is_positive() => {
                if let Err(e) = self.drain_data(ctx).await {
                    task.reject(e);
                    return;
                }
                if let Err(e) = self.dst.flush().await {
                    task.reject(FtpError::Transport(e));
                    return;
                }
                task.resolve(rsp);
            }
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            Signal::DataChunk(bytes) => {
                if let Err(e) = self.dst.write_all(&bytes).await {
                    task.reject(FtpError::Transport(e));
                }
            }
            // the retrieve settles on the end reply, not the data EOF
            Signal::DataEnd => {}
            Signal::Error(e) => task.reject(e),
        }
    }
}
