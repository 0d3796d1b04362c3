/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

mod client;
mod config;
mod context;
mod debug;
mod error;
mod response;
mod socket;
mod task;
mod tls;
mod transfer;

pub use client::FtpClient;
pub use config::{FtpClientConfig, FtpControlConfig, FtpTransferConfig};
pub use debug::{FTP_DEBUG_LOG_LEVEL, FTP_DEBUG_LOG_TARGET};
pub use error::{FtpError, ReplyParseError};
pub use response::FtpResponse;
pub use tls::FtpTlsConfig;
