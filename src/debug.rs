/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use log::Level;

pub const FTP_DEBUG_LOG_LEVEL: Level = Level::Debug;
pub const FTP_DEBUG_LOG_TARGET: &str = "ftpc";

#[inline]
pub(crate) fn log_cmd(cmd: &str) {
    log::log!(
        target: FTP_DEBUG_LOG_TARGET,
        FTP_DEBUG_LOG_LEVEL,
        "> {}",
        redact_command(cmd)
    );
}

#[inline]
pub(crate) fn log_rsp(rsp: &str) {
    log::log!(
        target: FTP_DEBUG_LOG_TARGET,
        FTP_DEBUG_LOG_LEVEL,
        "< {}",
        rsp
    );
}

/// The PASS argument must never reach the log sink in clear text.
pub(crate) fn redact_command(cmd: &str) -> &str {
    if cmd.len() > 5 && cmd[..5].eq_ignore_ascii_case("PASS ") {
        "PASS ###"
    } else {
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_is_redacted() {
        assert_eq!(redact_command("PASS secret"), "PASS ###");
        assert_eq!(redact_command("pass secret"), "PASS ###");
        assert_eq!(redact_command("USER alice"), "USER alice");
        assert_eq!(redact_command("PASV"), "PASV");
    }
}
