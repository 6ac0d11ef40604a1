//! Operation pipeline: ordered middleware around a terminal operation.
//!
//! # Responsibility
//! - Compose cross-cutting middleware around one business operation.
//! - Thread the payload inward in declared order and the result outward in
//!   reverse order (onion composition).
//!
//! # Invariants
//! - A middleware list is fixed when the pipeline is built; `with_middleware`
//!   returns a new pipeline and never mutates the receiver.
//! - Operation errors travel back through every layer unchanged.
//! - Under `ContinuationGuard::AtMostOnce`, a second `Next::run` on the same
//!   continuation fails with `PipelineError::ContinuationReused` instead of
//!   re-running the inner chain.
//! - Payloads are `Option`s on both sides; `None` is a valid value, not an error.
//!
//! # See also
//! - `pipeline::transaction` for the reentrant transaction scope.
//! - `pipeline::logging` for start/completion logging.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod logging;
pub mod transaction;

pub use logging::{describe_payload, LogFacade, LoggingMiddleware, OperationLogger};
pub use transaction::{TransactionMiddleware, TransactionalStore};

/// Pipeline misuse detected while running a chain.
///
/// Callers' error types implement `From<PipelineError>` so misuse surfaces
/// through the same channel as operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    /// Middleware at list position `position` invoked its continuation twice.
    ContinuationReused { position: usize },
    /// The transaction opened by this frame was already rolled back by a
    /// nested failure that an intermediate middleware swallowed.
    TransactionAborted,
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinuationReused { position } => write!(
                f,
                "middleware at position {position} invoked its continuation more than once"
            ),
            Self::TransactionAborted => {
                write!(f, "transaction was rolled back by a nested operation failure")
            }
        }
    }
}

impl Error for PipelineError {}

/// How strictly a pipeline polices `Next::run` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationGuard {
    /// A second call re-runs the rest of the chain.
    #[default]
    Unchecked,
    /// A second call fails with `PipelineError::ContinuationReused`.
    AtMostOnce,
}

/// Cross-cutting behavior wrapped around one operation invocation.
///
/// A well-behaved middleware calls `next.run(..)` exactly once and returns its
/// result, possibly transformed. Skipping `next` short-circuits the chain.
pub trait Middleware<I, O, E> {
    fn process(&self, data: Option<I>, next: &mut Next<'_, I, O, E>) -> Result<Option<O>, E>;
}

type Chain<I, O, E> = [Rc<dyn Middleware<I, O, E>>];

/// Continuation handed to a middleware: the rest of the chain plus the operation.
pub struct Next<'a, I, O, E> {
    chain: &'a Chain<I, O, E>,
    operation: &'a dyn Fn(Option<I>) -> Result<Option<O>, E>,
    guard: ContinuationGuard,
    position: usize,
    invoked: bool,
}

impl<I, O, E> Next<'_, I, O, E>
where
    E: From<PipelineError>,
{
    /// Runs the remaining middleware and then the operation.
    pub fn run(&mut self, data: Option<I>) -> Result<Option<O>, E> {
        if self.invoked && self.guard == ContinuationGuard::AtMostOnce {
            return Err(PipelineError::ContinuationReused {
                position: self.position,
            }
            .into());
        }
        self.invoked = true;
        dispatch(
            self.chain,
            self.position + 1,
            self.operation,
            self.guard,
            data,
        )
    }
}

fn dispatch<I, O, E>(
    chain: &Chain<I, O, E>,
    position: usize,
    operation: &dyn Fn(Option<I>) -> Result<Option<O>, E>,
    guard: ContinuationGuard,
    data: Option<I>,
) -> Result<Option<O>, E> {
    match chain.get(position) {
        None => operation(data),
        Some(middleware) => {
            let mut next = Next {
                chain,
                operation,
                guard,
                position,
                invoked: false,
            };
            middleware.process(data, &mut next)
        }
    }
}

/// Something that can run an operation, with or without middleware.
pub trait OperationRunner<I, O, E> {
    fn run<F>(&self, operation: F, data: Option<I>) -> Result<Option<O>, E>
    where
        F: Fn(Option<I>) -> Result<Option<O>, E>;
}

/// Identity runner: calls the operation directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPipeline;

impl NoPipeline {
    pub fn run<I, O, E, F>(&self, operation: F, data: Option<I>) -> Result<Option<O>, E>
    where
        F: Fn(Option<I>) -> Result<Option<O>, E>,
    {
        operation(data)
    }
}

impl<I, O, E> OperationRunner<I, O, E> for NoPipeline {
    fn run<F>(&self, operation: F, data: Option<I>) -> Result<Option<O>, E>
    where
        F: Fn(Option<I>) -> Result<Option<O>, E>,
    {
        operation(data)
    }
}

/// Immutable, ordered middleware composition.
///
/// The first middleware added is the outermost layer.
pub struct Pipeline<I, O, E> {
    middleware: Vec<Rc<dyn Middleware<I, O, E>>>,
    guard: ContinuationGuard,
}

impl<I, O, E> Pipeline<I, O, E> {
    /// Creates an empty pipeline without the continuation guard.
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            guard: ContinuationGuard::Unchecked,
        }
    }

    /// Creates an empty pipeline that rejects double continuation calls.
    pub fn operation_handler() -> Self {
        Self {
            middleware: Vec::new(),
            guard: ContinuationGuard::AtMostOnce,
        }
    }

    pub fn from_middleware(middleware: Vec<Rc<dyn Middleware<I, O, E>>>) -> Self {
        Self {
            middleware,
            guard: ContinuationGuard::Unchecked,
        }
    }

    /// Returns a new pipeline with `middleware` appended as the innermost layer.
    #[must_use]
    pub fn with_middleware<M>(&self, middleware: Rc<M>) -> Self
    where
        M: Middleware<I, O, E> + 'static,
    {
        let mut extended = self.clone();
        extended.middleware.push(middleware);
        extended
    }

    #[must_use]
    pub fn with_guard(&self, guard: ContinuationGuard) -> Self {
        Self {
            middleware: self.middleware.clone(),
            guard,
        }
    }

    pub fn guard(&self) -> ContinuationGuard {
        self.guard
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs `operation` with `data` through every middleware.
    pub fn run<F>(&self, operation: F, data: Option<I>) -> Result<Option<O>, E>
    where
        F: Fn(Option<I>) -> Result<Option<O>, E>,
    {
        dispatch(&self.middleware, 0, &operation, self.guard, data)
    }
}

impl<I, O, E> Clone for Pipeline<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
            guard: self.guard,
        }
    }
}

impl<I, O, E> Default for Pipeline<I, O, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O, E> OperationRunner<I, O, E> for Pipeline<I, O, E> {
    fn run<F>(&self, operation: F, data: Option<I>) -> Result<Option<O>, E>
    where
        F: Fn(Option<I>) -> Result<Option<O>, E>,
    {
        Pipeline::run(self, operation, data)
    }
}

/// Closure-backed middleware.
pub struct FnMiddleware<F> {
    f: F,
}

/// Wraps a closure as a middleware.
pub fn middleware_fn<I, O, E, F>(f: F) -> FnMiddleware<F>
where
    F: Fn(Option<I>, &mut Next<'_, I, O, E>) -> Result<Option<O>, E>,
{
    FnMiddleware { f }
}

impl<I, O, E, F> Middleware<I, O, E> for FnMiddleware<F>
where
    F: Fn(Option<I>, &mut Next<'_, I, O, E>) -> Result<Option<O>, E>,
{
    fn process(&self, data: Option<I>, next: &mut Next<'_, I, O, E>) -> Result<Option<O>, E> {
        (self.f)(data, next)
    }
}
