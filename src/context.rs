/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::config::FtpClientConfig;
use crate::debug;
use crate::error::FtpError;
use crate::response::ReplyParser;
use crate::socket::{FtpSocket, SocketEvent};
use crate::task::{Signal, Task, TaskHandler};
use crate::tls::{FtpTlsConfig, TlsState};

/// The serialized dispatcher owning the control socket and the transient
/// data socket.
///
/// At most one task is pending at any instant. Every socket event from
/// either socket is converted into a [`Signal`] and routed to that task's
/// handler until the handler settles it. Nothing reads or writes the
/// sockets outside of a pending task.
pub(crate) struct FtpContext {
    control: Option<FtpSocket>,
    data: Option<FtpSocket>,
    parser: ReplyParser,
    config: FtpClientConfig,
    host: String,
    tls: Option<TlsState>,
    task_pending: bool,
    closed: bool,
}

impl FtpContext {
    pub(crate) fn new(control: FtpSocket, host: String, config: FtpClientConfig) -> Self {
        FtpContext {
            control: Some(control),
            data: None,
            parser: ReplyParser::new(&config.control),
            config,
            host,
            tls: None,
            task_pending: false,
            closed: false,
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> &FtpClientConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.control.as_ref().map(|s| s.is_tls()).unwrap_or(false)
    }

    /// Destroy both sockets. Idempotent; a task pending in a concurrent
    /// routing loop observes `Closed` on its next signal.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.control = None;
        self.data = None;
        self.tls = None;
    }

    /// Install `handler` as the current task, write `command` if given,
    /// then route every signal to the handler until it settles the task.
    pub(crate) async fn dispatch<H>(
        &mut self,
        command: Option<&str>,
        handler: H,
    ) -> Result<H::Output, FtpError>
    where
        H: TaskHandler,
    {
        if self.closed {
            return Err(FtpError::Closed);
        }
        if self.task_pending {
            return Err(FtpError::Busy);
        }

        self.task_pending = true;
        let r = self.run_task(command, handler).await;
        self.task_pending = false;

        if let Err(e) = &r {
            self.data = None;
            if e.is_fatal() {
                self.close();
            }
        }
        r
    }

    async fn run_task<H>(
        &mut self,
        command: Option<&str>,
        mut handler: H,
    ) -> Result<H::Output, FtpError>
    where
        H: TaskHandler,
    {
        self.drop_stale_replies();

        if let Some(cmd) = command {
            self.send_command(cmd).await?;
        }

        let mut task = Task::new();
        loop {
            let signal = self.next_signal().await;
            handler.handle(self, signal, &mut task).await;
            if let Some(r) = task.take_result() {
                return r;
            }
        }
    }

    /// Convert the next socket occurrence into a routable signal.
    ///
    /// Replies already completed in the parse buffer are surfaced before
    /// any new read; control events are polled with priority over data
    /// events.
    async fn next_signal(&mut self) -> Signal {
        loop {
            match self.parser.next_reply() {
                Ok(Some(rsp)) => {
                    if self.config.verbose {
                        debug::log_rsp(&rsp.message);
                    }
                    return Signal::Response(rsp);
                }
                Ok(None) => {}
                Err(e) => return Signal::Error(FtpError::BadReply(e)),
            }

            let timeout = self.config.timeout;
            let (from_data, event) = match (&mut self.control, &mut self.data) {
                (Some(control), Some(data)) => {
                    tokio::select! {
                        biased;
                        ev = control.next_event(timeout) => (false, ev),
                        ev = data.next_event(timeout) => (true, ev),
                    }
                }
                (Some(control), None) => (false, control.next_event(timeout).await),
                (None, _) => return Signal::Error(FtpError::Closed),
            };

            match event {
                SocketEvent::Data(bytes) => {
                    if from_data {
                        return Signal::DataChunk(bytes);
                    }
                    self.parser.feed(&bytes);
                }
                SocketEvent::Closed => {
                    if from_data {
                        self.data = None;
                        return Signal::DataEnd;
                    }
                    self.control = None;
                    return Signal::Error(FtpError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "control connection closed by server",
                    )));
                }
                SocketEvent::Timeout => return Signal::Error(FtpError::Timeout),
                SocketEvent::Error(e) => {
                    if from_data {
                        self.data = None;
                    }
                    return Signal::Error(FtpError::Transport(e));
                }
            }
        }
    }

    /// Write `command` + CRLF on the control socket. Also the seam for
    /// continuation writes from handlers, e.g. `RETR` after a `350`.
    pub(crate) async fn send_command(&mut self, command: &str) -> Result<(), FtpError> {
        if self.config.verbose {
            debug::log_cmd(command);
        }
        let Some(control) = &mut self.control else {
            return Err(FtpError::Closed);
        };
        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str("\r\n");
        control
            .write_all(line.as_bytes())
            .await
            .map_err(FtpError::Transport)
    }

    /// Replies addressed to no task are logged and dropped.
    fn drop_stale_replies(&mut self) {
        while let Ok(Some(rsp)) = self.parser.next_reply() {
            if self.config.verbose {
                debug::log_rsp(&rsp.message);
            }
        }
    }

    /// Best-effort wait for a late end-of-transfer reply so it does not
    /// leak into the next task.
    pub(crate) async fn absorb_end_reply(&mut self) {
        loop {
            match self.parser.next_reply() {
                Ok(Some(rsp)) => {
                    if self.config.verbose {
                        debug::log_rsp(&rsp.message);
                    }
                    return;
                }
                Ok(None) => {}
                Err(_) => return,
            }
            let Some(control) = &mut self.control else {
                return;
            };
            match control.next_event(self.config.transfer.end_wait_timeout).await {
                SocketEvent::Data(bytes) => self.parser.feed(&bytes),
                _ => return,
            }
        }
    }

    /// Consume the plain control socket, perform the TLS handshake and
    /// re-install the wrapped socket. The TLS state is kept for wrapping
    /// data connections with the same options and session.
    pub(crate) async fn upgrade_control_tls(
        &mut self,
        config: &FtpTlsConfig,
    ) -> Result<(), FtpError> {
        let socket = self.control.take().ok_or(FtpError::Closed)?;
        let stream = match socket {
            FtpSocket::Tls(_) => {
                self.control = Some(socket);
                return Ok(());
            }
            FtpSocket::Plain(stream) => stream,
        };

        let mut tls = TlsState::new(config, &self.host)?;
        let handshake = tls.handshake(stream);
        let stream = if self.config.timeout.is_zero() {
            handshake.await?
        } else {
            match tokio::time::timeout(self.config.timeout, handshake).await {
                Ok(r) => r?,
                Err(_) => return Err(FtpError::Timeout),
            }
        };

        self.control = Some(FtpSocket::Tls(stream));
        self.tls = Some(tls);
        Ok(())
    }

    /// Dial the announced passive endpoint and install it as the data
    /// socket, TLS-wrapped when the control session is secured.
    pub(crate) async fn open_data_connection(
        &mut self,
        host: &str,
        port: u16,
    ) -> Result<(), FtpError> {
        let dial = TcpStream::connect((host, port));
        let stream = if self.config.timeout.is_zero() {
            dial.await.map_err(FtpError::DataDialFailed)?
        } else {
            match tokio::time::timeout(self.config.timeout, dial).await {
                Ok(r) => r.map_err(FtpError::DataDialFailed)?,
                Err(_) => {
                    return Err(FtpError::DataDialFailed(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "data connect timed out",
                    )));
                }
            }
        };

        let socket = match &mut self.tls {
            Some(tls) => FtpSocket::Tls(tls.handshake(stream).await?),
            None => FtpSocket::Plain(stream),
        };
        self.data = Some(socket);
        Ok(())
    }

    pub(crate) fn release_data_socket(&mut self) {
        self.data = None;
    }

    /// Pipe the caller's source into the data socket, then half-close it
    /// so the server sees EOF. Writes honor the uniform timeout.
    pub(crate) async fn pump_upload<R>(&mut self, src: &mut R) -> Result<(), FtpError>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let timeout = self.config.timeout;
        let Some(data) = &mut self.data else {
            return Err(FtpError::DataDialFailed(io::Error::new(
                io::ErrorKind::NotConnected,
                "no data connection",
            )));
        };

        let mut buf = vec![0u8; self.config.transfer.buffer_size];
        loop {
            let n = src.read(&mut buf).await.map_err(FtpError::Transport)?;
            if n == 0 {
                break;
            }
            timed_io(timeout, data.write_all(&buf[..n])).await?;
        }
        timed_io(timeout, data.shutdown()).await
    }

    /// Read one event from the data socket only, releasing the slot on
    /// EOF or error. `None` when no data socket is installed.
    pub(crate) async fn next_data_event(&mut self, timeout: Duration) -> Option<SocketEvent> {
        let data = self.data.as_mut()?;
        let event = data.next_event(timeout).await;
        if matches!(event, SocketEvent::Closed | SocketEvent::Error(_)) {
            self.data = None;
        }
        Some(event)
    }
}

async fn timed_io<F>(timeout: Duration, fut: F) -> Result<(), FtpError>
where
    F: std::future::Future<Output = io::Result<()>>,
{
    if timeout.is_zero() {
        fut.await.map_err(FtpError::Transport)
    } else {
        match tokio::time::timeout(timeout, fut).await {
            Ok(r) => r.map_err(FtpError::Transport),
            Err(_) => Err(FtpError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::net::TcpListener;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        type Output = ();

        async fn handle(&mut self, _ctx: &mut FtpContext, signal: Signal, task: &mut Task<()>) {
            if let Signal::Error(e) = signal {
                task.reject(e);
            }
        }
    }

    async fn loopback_context() -> FtpContext {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let stream = TcpStream::connect(addr).await.unwrap();
        // keep the peer half alive for the duration of the test
        tokio::spawn(async move {
            let _peer = accept.await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let socket = FtpSocket::new_plain(stream).unwrap();
        FtpContext::new(socket, "127.0.0.1".to_string(), FtpClientConfig::default())
    }

    #[tokio::test]
    async fn dispatch_while_pending_is_busy() {
        let mut ctx = loopback_context().await;
        ctx.task_pending = true;
        let r = ctx.dispatch(Some("NOOP"), NoopHandler).await;
        assert!(matches!(r, Err(FtpError::Busy)));
        assert!(!ctx.closed());
    }

    #[tokio::test]
    async fn dispatch_after_close_is_rejected() {
        let mut ctx = loopback_context().await;
        ctx.close();
        ctx.close();
        let r = ctx.dispatch(Some("NOOP"), NoopHandler).await;
        assert!(matches!(r, Err(FtpError::Closed)));
        assert!(ctx.closed());
    }
}
