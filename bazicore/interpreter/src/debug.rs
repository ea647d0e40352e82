//! Debug protocol types. Controllers send [`Request`]s over a channel the
//! engine polls at statement boundaries; the engine publishes an ordered
//! [`EngineEvent`] stream that mirrors every state transition.

use crate::value::Value;

/// Engine lifecycle. `Pause` is only reachable from `Running` and always
/// returns to `Running` (or `Stopped`) before anything else happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed, not started.
    Ready,
    /// Resolving capabilities and initializing globals.
    Preparing,
    Running,
    /// Suspended at a statement boundary, waiting for Resume or Stop.
    Pause,
    /// Ran to completion.
    Idle,
    /// Stopped on external request.
    Stopped,
    /// Terminated by an unrecoverable error.
    StoppedWithError,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Idle | State::Stopped | State::StoppedWithError)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Ready => "ready",
            State::Preparing => "preparing",
            State::Running => "running",
            State::Pause => "pause",
            State::Idle => "idle",
            State::Stopped => "stopped",
            State::StoppedWithError => "stopped with error",
        };
        f.write_str(s)
    }
}

/// Controller-to-engine messages. Observed cooperatively, never mid-statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Pause,
    Resume,
    Stop,
}

/// Classification of a run-terminating failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host boundary failure (missing member, bad arguments, rejected capability).
    Invocation,
    /// Operand types that can never combine.
    Cast,
    /// A thrown value no TRY/CATCH handled.
    UnhandledException,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ErrorKind::Invocation => "invocation error",
            ErrorKind::Cast => "cast error",
            ErrorKind::UnhandledException => "unhandled exception",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl std::error::Error for ExecError {}

/// Point-in-time view of the engine, safe to read from any thread. The line
/// is the last statement boundary the engine crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSnapshot {
    pub state: State,
    pub line: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged(State),
    /// Execution-trace line (method entry, suspension reasons, worker lifecycle).
    Log(String),
    /// A BREAKPOINT statement suspended the engine.
    BreakpointHit { line: u32 },
    Error(ExecError),
    /// Entry point (or a worker) produced a value.
    Returned(Value),
}
