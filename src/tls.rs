/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use std::net::IpAddr;
use std::pin::Pin;

use openssl::ssl::{SslConnector, SslMethod, SslSession, SslVerifyMode};
use openssl::x509::X509VerifyResult;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::error::FtpError;

/// TLS options captured at `AUTH TLS` time and reused for data connections.
#[derive(Clone, Debug, Default)]
pub struct FtpTlsConfig {
    /// Refuse peers whose certificate chain or host name does not verify.
    /// Off only for servers with self-signed certificates.
    pub accept_unauthorized: bool,
    /// Name used for SNI and certificate verification instead of the
    /// host the control connection was dialed with.
    pub server_name: Option<String>,
}

/// Connector state shared by the control upgrade and later data wraps.
pub(crate) struct TlsState {
    connector: SslConnector,
    verify_peer: bool,
    server_name: String,
    session: Option<SslSession>,
}

impl TlsState {
    pub(crate) fn new(config: &FtpTlsConfig, host: &str) -> Result<Self, FtpError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        if config.accept_unauthorized {
            builder.set_verify(SslVerifyMode::NONE);
        }
        let server_name = config
            .server_name
            .clone()
            .unwrap_or_else(|| host.to_string());
        Ok(TlsState {
            connector: builder.build(),
            verify_peer: !config.accept_unauthorized,
            server_name,
            session: None,
        })
    }

    /// Hand a TCP socket to the TLS layer and await the handshake.
    ///
    /// The negotiated session is recorded so the next handshake (the data
    /// connection) resumes it, which strict FTPS servers require.
    pub(crate) async fn handshake(
        &mut self,
        stream: TcpStream,
    ) -> Result<SslStream<TcpStream>, FtpError> {
        let mut ssl_config = self.connector.configure()?;
        if !self.verify_peer {
            ssl_config.set_verify_hostname(false);
        }
        if self.server_name.parse::<IpAddr>().is_ok() {
            ssl_config.set_use_server_name_indication(false);
            ssl_config.set_verify_hostname(false);
        }
        if let Some(session) = &self.session {
            unsafe { ssl_config.set_session(session)? };
        }
        let ssl = ssl_config.into_ssl(&self.server_name)?;

        let mut stream = SslStream::new(ssl, stream)?;
        match Pin::new(&mut stream).connect().await {
            Ok(()) => {
                if let Some(session) = stream.ssl().session() {
                    self.session = Some(session.to_owned());
                }
                Ok(stream)
            }
            Err(e) => {
                let verify = stream.ssl().verify_result();
                if self.verify_peer && verify != X509VerifyResult::OK {
                    Err(FtpError::TlsAuthorizationFailed(verify))
                } else {
                    Err(FtpError::TlsHandshakeFailed(e))
                }
            }
        }
    }
}
