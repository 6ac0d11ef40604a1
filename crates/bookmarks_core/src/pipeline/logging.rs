//! Start/completion logging middleware.
//!
//! # Responsibility
//! - Record one "start" entry before the operation runs and one "ok" entry
//!   after it returns, naming the payload type (or `null`).
//!
//! # Invariants
//! - Errors are never caught here; a failing operation leaves only the
//!   "start" entry behind.
//! - Payloads are described structurally (type name), never by content.

use crate::pipeline::{Middleware, Next, PipelineError};
use log::Level;
use std::any::type_name;
use std::rc::Rc;
use std::time::Instant;

const LOG_TARGET: &str = "bookmarks_core::pipeline";
const NULL_PAYLOAD: &str = "null";

/// Sink for pipeline log lines.
pub trait OperationLogger {
    fn log(&self, level: Level, message: &str);
}

/// Logger forwarding to the `log` crate facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl OperationLogger for LogFacade {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: LOG_TARGET, level, "{message}");
    }
}

impl<L: OperationLogger + ?Sized> OperationLogger for Rc<L> {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message);
    }
}

impl<L: OperationLogger + ?Sized> OperationLogger for &L {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message);
    }
}

/// Describes a payload by its type name, or `null` when absent.
pub fn describe_payload<T>(payload: &Option<T>) -> &'static str {
    match payload {
        Some(_) => type_name::<T>(),
        None => NULL_PAYLOAD,
    }
}

/// Middleware emitting start/completion entries around an operation.
pub struct LoggingMiddleware<L = LogFacade> {
    logger: L,
    level: Level,
    operation: &'static str,
}

impl LoggingMiddleware<LogFacade> {
    /// Logs through the `log` facade at `Debug` level.
    pub fn new() -> Self {
        Self::with_logger(LogFacade)
    }
}

impl Default for LoggingMiddleware<LogFacade> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: OperationLogger> LoggingMiddleware<L> {
    pub fn with_logger(logger: L) -> Self {
        Self {
            logger,
            level: Level::Debug,
            operation: "anonymous",
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the operation label written as `op=<name>`.
    #[must_use]
    pub fn named(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl<I, O, E, L> Middleware<I, O, E> for LoggingMiddleware<L>
where
    L: OperationLogger,
    E: From<PipelineError>,
{
    fn process(&self, data: Option<I>, next: &mut Next<'_, I, O, E>) -> Result<Option<O>, E> {
        self.logger.log(
            self.level,
            &format!(
                "event=operation module=pipeline status=start op={} input={}",
                self.operation,
                describe_payload(&data)
            ),
        );
        let started_at = Instant::now();

        let output = next.run(data)?;

        self.logger.log(
            self.level,
            &format!(
                "event=operation module=pipeline status=ok op={} output={} duration_ms={}",
                self.operation,
                describe_payload(&output),
                started_at.elapsed().as_millis()
            ),
        );
        Ok(output)
    }
}
