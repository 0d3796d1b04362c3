/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FtpClientConfig {
    pub control: FtpControlConfig,
    pub transfer: FtpTransferConfig,
    /// Idle timeout applied uniformly to the control and the data socket,
    /// and to connection dials. Zero disables it.
    pub timeout: Duration,
    /// Log every command and reply on the control channel.
    pub verbose: bool,
    /// Try EPSV before falling back to PASV when preparing a transfer.
    pub always_try_epsv: bool,
}

impl Default for FtpClientConfig {
    fn default() -> Self {
        FtpClientConfig {
            control: FtpControlConfig::default(),
            transfer: FtpTransferConfig::default(),
            timeout: Duration::from_secs(30),
            verbose: false,
            always_try_epsv: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FtpControlConfig {
    pub max_line_len: usize,
    pub max_multi_lines: usize,
}

impl Default for FtpControlConfig {
    fn default() -> Self {
        FtpControlConfig {
            max_line_len: 2048,
            max_multi_lines: 128,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FtpTransferConfig {
    /// How long to wait for the late side of the end-of-transfer pair
    /// (data socket EOF vs the end reply) once the other side arrived.
    pub end_wait_timeout: Duration,
    /// Copy buffer size for uploads.
    pub buffer_size: usize,
}

impl Default for FtpTransferConfig {
    fn default() -> Self {
        FtpTransferConfig {
            end_wait_timeout: Duration::from_secs(2),
            buffer_size: 16384,
        }
    }
}
