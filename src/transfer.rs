/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use async_trait::async_trait;

use crate::context::FtpContext;
use crate::error::FtpError;
use crate::task::{Signal, Task, TaskHandler};

/// Parse a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub(crate) fn parse_pasv_reply(line: &str) -> Option<SocketAddr> {
    let p_start = memchr::memchr(b'(', line.as_bytes())?;
    let p_end = memchr::memchr(b')', &line.as_bytes()[p_start..])? + p_start;

    let a: Vec<&str> = line[p_start + 1..p_end].split(',').collect();
    if a.len() != 6 {
        return None;
    }

    let h1 = u8::from_str(a[0]).ok()?;
    let h2 = u8::from_str(a[1]).ok()?;
    let h3 = u8::from_str(a[2]).ok()?;
    let h4 = u8::from_str(a[3]).ok()?;
    let p1 = u8::from_str(a[4]).ok()?;
    let p2 = u8::from_str(a[5]).ok()?;

    let ip = IpAddr::V4(Ipv4Addr::new(h1, h2, h3, h4));
    let port = ((p1 as u16) << 8) + (p2 as u16);
    Some(SocketAddr::new(ip, port))
}

/// Parse a `229 Entering Extended Passive Mode (|||port|)` reply.
pub(crate) fn parse_epsv_reply(line: &str) -> Option<u16> {
    let p_start = memchr::memchr(b'(', line.as_bytes())?;
    let p_end = memchr::memchr(b')', &line.as_bytes()[p_start..])? + p_start;

    if !line[p_start + 1..p_end].starts_with("|||") {
        return None;
    }
    if p_end - 1 <= p_start + 4 {
        return None;
    }
    if line.as_bytes()[p_end - 1] != b'|' {
        return None;
    }
    u16::from_str(&line[p_start + 4..p_end - 1]).ok()
}

struct PasvHandler;

#[async_trait]
impl TaskHandler for PasvHandler {
    type Output = SocketAddr;

    async fn handle(
        &mut self,
        _ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<SocketAddr>,
    ) {
        match signal {
            Signal::Response(rsp) if rsp.code == 227 => match parse_pasv_reply(&rsp.message) {
                Some(addr) => task.resolve(addr),
                None => task.reject(FtpError::BadPasvReply(rsp.message)),
            },
            Signal::Response(rsp) if rsp.is_preliminary() => {}
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            Signal::Error(e) => task.reject(e),
            Signal::DataChunk(_) | Signal::DataEnd => {}
        }
    }
}

struct EpsvHandler;

#[async_trait]
impl TaskHandler for EpsvHandler {
    type Output = u16;

    async fn handle(&mut self, _ctx: &mut FtpContext, signal: Signal, task: &mut Task<u16>) {
        match signal {
            Signal::Response(rsp) if rsp.code == 229 => match parse_epsv_reply(&rsp.message) {
                Some(port) => task.resolve(port),
                None => task.reject(FtpError::BadPasvReply(rsp.message)),
            },
            Signal::Response(rsp) if rsp.is_preliminary() => {}
            Signal::Response(rsp) => task.reject(FtpError::Protocol(rsp)),
            Signal::Error(e) => task.reject(e),
            Signal::DataChunk(_) | Signal::DataEnd => {}
        }
    }
}

/// Prepare the passive-mode data connection for the next transfer
/// command, trying EPSV first when configured.
pub(crate) async fn prepare_data_connection(ctx: &mut FtpContext) -> Result<(), FtpError> {
    if ctx.config().always_try_epsv {
        match prepare_epsv(ctx).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => {}
        }
    }
    prepare_pasv(ctx).await
}

async fn prepare_pasv(ctx: &mut FtpContext) -> Result<(), FtpError> {
    let addr = ctx.dispatch(Some("PASV"), PasvHandler).await?;
    ctx.open_data_connection(&addr.ip().to_string(), addr.port())
        .await
}

async fn prepare_epsv(ctx: &mut FtpContext) -> Result<(), FtpError> {
    let port = ctx.dispatch(Some("EPSV"), EpsvHandler).await?;
    let host = ctx.host().to_string();
    ctx.open_data_connection(&host, port).await
}
