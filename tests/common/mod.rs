/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub type ControlLines = tokio::io::Lines<BufReader<OwnedReadHalf>>;

/// Accept one control connection and split it into a line reader and a
/// writer.
pub async fn accept_control(listener: &TcpListener) -> (ControlLines, OwnedWriteHalf) {
    let (stream, _) = listener.accept().await.unwrap();
    let (r, w) = stream.into_split();
    (BufReader::new(r).lines(), w)
}

/// Serve one scripted control session: send the greeting, then for each
/// step expect the given command line and send the given reply. The
/// connection is held open afterwards so the client never sees an
/// unexpected EOF.
pub async fn script_server(
    greeting: &'static str,
    steps: &'static [(&'static str, &'static str)],
) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut lines, mut w) = accept_control(&listener).await;
        w.write_all(greeting.as_bytes()).await.unwrap();
        for (expect, reply) in steps {
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(&line, expect);
            if !reply.is_empty() {
                w.write_all(reply.as_bytes()).await.unwrap();
            }
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    (addr, handle)
}
