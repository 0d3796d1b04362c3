/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::sync::Mutex;

use log::{LevelFilter, Log, Metadata, Record};

use ftpc::{FtpClient, FtpClientConfig, FTP_DEBUG_LOG_TARGET};

mod common;
use common::script_server;

static SINK: Mutex<Vec<String>> = Mutex::new(Vec::new());

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == FTP_DEBUG_LOG_TARGET
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            SINK.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

#[tokio::test]
async fn password_never_reaches_the_log_sink() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Debug);

    let (addr, _server) = script_server(
        "220 ok\r\n",
        &[
            ("USER alice", "331 need password\r\n"),
            ("PASS secret", "230 logged in\r\n"),
        ],
    )
    .await;

    let config = FtpClientConfig {
        verbose: true,
        ..Default::default()
    };
    let mut client = FtpClient::connect(&addr.ip().to_string(), addr.port(), config)
        .await
        .unwrap();
    client.login("alice", "secret").await.unwrap();

    let lines = SINK.lock().unwrap();
    assert!(lines.iter().any(|l| l == "> USER alice"));
    assert!(lines.iter().any(|l| l == "> PASS ###"));
    assert!(lines.iter().any(|l| l == "< 220 ok"));
    assert!(lines.iter().any(|l| l == "< 230 logged in"));
    assert!(!lines.iter().any(|l| l.contains("secret")));
}
