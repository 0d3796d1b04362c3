/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 the ftpc authors
 */

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::FtpContext;
use crate::error::FtpError;
use crate::response::FtpResponse;

/// One routed occurrence the active handler must inspect.
#[derive(Debug)]
pub(crate) enum Signal {
    Response(FtpResponse),
    DataChunk(Bytes),
    DataEnd,
    Error(FtpError),
}

enum TaskStatus<T> {
    Pending,
    Resolved(T),
    Rejected(FtpError),
}

/// The single in-flight operation owned by the dispatcher.
///
/// `resolve` and `reject` settle the task at most once; later calls are
/// ignored.
pub(crate) struct Task<T> {
    status: TaskStatus<T>,
}

impl<T> Task<T> {
    pub(crate) fn new() -> Self {
        Task {
            status: TaskStatus::Pending,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    pub(crate) fn resolve(&mut self, value: T) {
        if self.is_pending() {
            self.status = TaskStatus::Resolved(value);
        }
    }

    pub(crate) fn reject(&mut self, error: FtpError) {
        if self.is_pending() {
            self.status = TaskStatus::Rejected(error);
        }
    }

    pub(crate) fn take_result(&mut self) -> Option<Result<T, FtpError>> {
        match std::mem::replace(&mut self.status, TaskStatus::Pending) {
            TaskStatus::Pending => None,
            TaskStatus::Resolved(v) => Some(Ok(v)),
            TaskStatus::Rejected(e) => Some(Err(e)),
        }
    }
}

impl Task<FtpResponse> {
    /// Shared reply policy: 2xx/3xx resolve, 4xx/5xx reject, 1xx keeps
    /// the task pending.
    pub(crate) fn classify(&mut self, rsp: FtpResponse) {
        if rsp.is_positive() {
            self.resolve(rsp);
        } else if rsp.is_failure() {
            self.reject(FtpError::Protocol(rsp));
        }
    }
}

/// Inspects every routed signal until it settles the task.
#[async_trait]
pub(crate) trait TaskHandler: Send {
    type Output: Send;

    async fn handle(
        &mut self,
        ctx: &mut FtpContext,
        signal: Signal,
        task: &mut Task<Self::Output>,
    );
}
