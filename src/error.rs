/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::io;

use openssl::error::ErrorStack;
use openssl::ssl;
use openssl::x509::X509VerifyResult;
use thiserror::Error;

use crate::response::FtpResponse;

/// Errors raised while recognizing a reply on the control channel.
#[derive(Debug, Error)]
pub enum ReplyParseError {
    #[error("invalid reply line format")]
    InvalidLineFormat,
    #[error("invalid reply code {0}")]
    InvalidReplyCode(u16),
    #[error("reply line too long")]
    LineTooLong,
    #[error("too many lines in multi-line reply")]
    TooManyLines,
    #[error("reply line is not utf-8")]
    LineIsNotUtf8,
}

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("bad reply: {0}")]
    BadReply(#[from] ReplyParseError),
    #[error("server replied with error: {}", .0.message)]
    Protocol(FtpResponse),
    #[error("unparseable passive mode reply: {0}")]
    BadPasvReply(String),
    #[error("unable to open data connection: {0:?}")]
    DataDialFailed(io::Error),
    #[error("tls setup failed: {0}")]
    TlsSetup(#[from] ErrorStack),
    #[error("tls handshake failed: {0}")]
    TlsHandshakeFailed(ssl::Error),
    #[error("peer certificate not authorized: {0}")]
    TlsAuthorizationFailed(X509VerifyResult),
    #[error("socket timed out")]
    Timeout,
    #[error("client closed")]
    Closed,
    #[error("another task is still pending")]
    Busy,
    #[error("transport error: {0:?}")]
    Transport(io::Error),
}

impl FtpError {
    /// Errors after which the control connection can not be used again.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            FtpError::BadReply(_)
                | FtpError::TlsSetup(_)
                | FtpError::TlsHandshakeFailed(_)
                | FtpError::TlsAuthorizationFailed(_)
                | FtpError::Timeout
                | FtpError::Closed
                | FtpError::Transport(_)
        )
    }
}
