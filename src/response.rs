/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use bytes::BytesMut;

use crate::config::FtpControlConfig;
use crate::error::ReplyParseError;

/// A complete reply received on the control channel.
///
/// `message` is the full reply text including the code prefix and any
/// continuation lines, CRLF-joined and trimmed of the trailing CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpResponse {
    pub code: u16,
    pub message: String,
}

impl FtpResponse {
    /// 1xx, a transfer is about to start or is in progress.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx or 3xx.
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    /// 4xx or 5xx.
    pub fn is_failure(&self) -> bool {
        self.code >= 400
    }
}

macro_rules! char_to_u16 {
    ($c:expr) => {
        ($c - b'0') as u16
    };
}

/// Incremental reply recognizer.
///
/// Feed raw control-channel chunks in, pop complete replies out. Bytes
/// beyond a complete reply stay buffered for the next one.
pub(crate) struct ReplyParser {
    buf: BytesMut,
    max_line_len: usize,
    max_multi_lines: usize,
}

impl ReplyParser {
    pub(crate) fn new(config: &FtpControlConfig) -> Self {
        ReplyParser {
            buf: BytesMut::with_capacity(config.max_line_len),
            max_line_len: config.max_line_len,
            max_multi_lines: config.max_multi_lines,
        }
    }

    pub(crate) fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete reply, if one is fully buffered.
    pub(crate) fn next_reply(&mut self) -> Result<Option<FtpResponse>, ReplyParseError> {
        if self.buf.len() < 4 {
            if !self.buf.is_empty() {
                self.check_partial_lead()?;
            }
            return Ok(None);
        }

        let code = Self::leading_code(&self.buf)?;
        match self.buf[3] {
            b' ' => self.pop_single_line(code),
            b'-' => self.pop_multi_line(code),
            _ => Err(ReplyParseError::InvalidLineFormat),
        }
    }

    /// Reject obvious garbage without waiting for the rest of the line.
    fn check_partial_lead(&self) -> Result<(), ReplyParseError> {
        for c in self.buf.iter() {
            if !c.is_ascii_digit() {
                return Err(ReplyParseError::InvalidLineFormat);
            }
        }
        Ok(())
    }

    fn leading_code(line: &[u8]) -> Result<u16, ReplyParseError> {
        if !line[0].is_ascii_digit() || !line[1].is_ascii_digit() || !line[2].is_ascii_digit() {
            return Err(ReplyParseError::InvalidLineFormat);
        }
        let code = char_to_u16!(line[0]) * 100 + char_to_u16!(line[1]) * 10 + char_to_u16!(line[2]);
        if !(100..600).contains(&code) {
            return Err(ReplyParseError::InvalidReplyCode(code));
        }
        Ok(code)
    }

    fn pop_single_line(
        &mut self,
        code: u16,
    ) -> Result<Option<FtpResponse>, ReplyParseError> {
        let Some(p) = memchr::memchr(b'\n', &self.buf) else {
            if self.buf.len() > self.max_line_len {
                return Err(ReplyParseError::LineTooLong);
            }
            return Ok(None);
        };
        if p >= self.max_line_len {
            return Err(ReplyParseError::LineTooLong);
        }

        let line = self.buf.split_to(p + 1);
        let text = std::str::from_utf8(&line)
            .map_err(|_| ReplyParseError::LineIsNotUtf8)?
            .trim_end();
        Ok(Some(FtpResponse {
            code,
            message: text.to_string(),
        }))
    }

    fn pop_multi_line(
        &mut self,
        code: u16,
    ) -> Result<Option<FtpResponse>, ReplyParseError> {
        let end_prefix = [self.buf[0], self.buf[1], self.buf[2], b' '];

        let mut offset = 0;
        let mut lines = 0;
        loop {
            let Some(p) = memchr::memchr(b'\n', &self.buf[offset..]) else {
                if self.buf.len() - offset > self.max_line_len {
                    return Err(ReplyParseError::LineTooLong);
                }
                return Ok(None);
            };
            if p >= self.max_line_len {
                return Err(ReplyParseError::LineTooLong);
            }
            let line_end = offset + p + 1;
            lines += 1;
            if lines > self.max_multi_lines {
                return Err(ReplyParseError::TooManyLines);
            }

            // lines that start with the same digits but no space do not
            // terminate the block
            if offset > 0 && self.buf[offset..].starts_with(&end_prefix) {
                let block = self.buf.split_to(line_end);
                let text = std::str::from_utf8(&block)
                    .map_err(|_| ReplyParseError::LineIsNotUtf8)?;
                let message = text
                    .lines()
                    .map(str::trim_end)
                    .collect::<Vec<&str>>()
                    .join("\r\n");
                return Ok(Some(FtpResponse { code, message }));
            }

            offset = line_end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReplyParser {
        ReplyParser::new(&FtpControlConfig::default())
    }

    fn collect_all(parser: &mut ReplyParser) -> Vec<FtpResponse> {
        let mut all = Vec::new();
        while let Some(rsp) = parser.next_reply().unwrap() {
            all.push(rsp);
        }
        all
    }

    #[test]
    fn single_line() {
        let mut p = parser();
        p.feed(b"220 Service ready\r\n");
        let rsp = p.next_reply().unwrap().unwrap();
        assert_eq!(rsp.code, 220);
        assert_eq!(rsp.message, "220 Service ready");
        assert!(p.next_reply().unwrap().is_none());
    }

    #[test]
    fn multi_line() {
        let mut p = parser();
        p.feed(b"211-Features:\r\n UTF8\r\n MLST\r\n211 End\r\n");
        let rsp = p.next_reply().unwrap().unwrap();
        assert_eq!(rsp.code, 211);
        assert_eq!(rsp.message, "211-Features:\r\n UTF8\r\n MLST\r\n211 End");
    }

    #[test]
    fn multi_line_inner_code_without_space() {
        let mut p = parser();
        p.feed(b"211-A\r\n2110 B\r\n211-C\r\n211 End\r\n");
        let rsp = p.next_reply().unwrap().unwrap();
        assert_eq!(rsp.code, 211);
        assert_eq!(rsp.message, "211-A\r\n2110 B\r\n211-C\r\n211 End");
    }

    #[test]
    fn concatenated_replies_leave_no_residue() {
        let mut p = parser();
        p.feed(b"220 hello\r\n331 user ok\r\n230 logged in\r\n");
        let all = collect_all(&mut p);
        let codes: Vec<u16> = all.iter().map(|r| r.code).collect();
        assert_eq!(codes, [220, 331, 230]);
        assert!(p.next_reply().unwrap().is_none());
    }

    #[test]
    fn chunking_is_equivalent() {
        let stream: &[u8] = b"220 hello\r\n211-f:\r\n line\r\n211 End\r\n150 go\r\n";

        let mut whole = parser();
        whole.feed(stream);
        let expected = collect_all(&mut whole);
        assert_eq!(expected.len(), 3);

        // every split point of the stream into two chunks
        for cut in 0..=stream.len() {
            let mut p = parser();
            p.feed(&stream[..cut]);
            let mut got = collect_all(&mut p);
            p.feed(&stream[cut..]);
            got.extend(collect_all(&mut p));
            assert_eq!(got, expected, "split at {cut}");
        }

        // one byte at a time
        let mut p = parser();
        let mut got = Vec::new();
        for b in stream {
            p.feed(std::slice::from_ref(b));
            got.extend(collect_all(&mut p));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn garbage_lead_is_rejected() {
        let mut p = parser();
        p.feed(b"Hello world\r\n");
        assert!(matches!(
            p.next_reply(),
            Err(ReplyParseError::InvalidLineFormat)
        ));
    }

    #[test]
    fn out_of_range_code_is_rejected() {
        let mut p = parser();
        p.feed(b"099 too low\r\n");
        assert!(matches!(
            p.next_reply(),
            Err(ReplyParseError::InvalidReplyCode(99))
        ));
    }

    #[test]
    fn long_line_is_rejected() {
        let mut p = parser();
        p.feed(b"200 ");
        p.feed(&vec![b'a'; 4096]);
        assert!(matches!(p.next_reply(), Err(ReplyParseError::LineTooLong)));
    }

    #[test]
    fn partial_reply_stays_buffered() {
        let mut p = parser();
        p.feed(b"22");
        assert!(p.next_reply().unwrap().is_none());
        p.feed(b"0 ok");
        assert!(p.next_reply().unwrap().is_none());
        p.feed(b"\r\n");
        assert_eq!(p.next_reply().unwrap().unwrap().code, 220);
    }
}
