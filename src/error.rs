//! Bridge error taxonomy and the result type crossing the tool boundary.

use serde::Serialize;

/// Machine-readable failure kind, stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingArgument,
    BuildError,
    ExecutableNotFound,
    Timeout,
    EngineExecutionError,
    EngineReportedError,
    EmptyResult,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingArgument => "missing_argument",
            ErrorKind::BuildError => "build_error",
            ErrorKind::ExecutableNotFound => "executable_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::EngineExecutionError => "engine_execution_error",
            ErrorKind::EngineReportedError => "engine_reported_error",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing required argument `{name}` for tool `{tool}`")]
    MissingArgument { tool: &'static str, name: String },
    #[error("cannot build engine program from `{name}`: {reason}")]
    Build { name: String, reason: String },
    #[error("engine executable not found: {path}")]
    ExecutableNotFound { path: String },
    #[error("engine did not complete within {seconds} seconds")]
    Timeout { seconds: u64 },
    #[error("engine exited with status {status}: {diagnostic}")]
    EngineExecution { status: i32, diagnostic: String },
    #[error("engine reported an error: {diagnostic}")]
    EngineReported { diagnostic: String },
    #[error("engine exited cleanly but produced no output")]
    EmptyResult,
    #[error("internal bridge fault: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::MissingArgument { .. } => ErrorKind::MissingArgument,
            ToolError::Build { .. } => ErrorKind::BuildError,
            ToolError::ExecutableNotFound { .. } => ErrorKind::ExecutableNotFound,
            ToolError::Timeout { .. } => ErrorKind::Timeout,
            ToolError::EngineExecution { .. } => ErrorKind::EngineExecutionError,
            ToolError::EngineReported { .. } => ErrorKind::EngineReportedError,
            ToolError::EmptyResult => ErrorKind::EmptyResult,
            ToolError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

/// Successful engine invocation: normalized text plus the raw stdout
/// for transparency. Exact symbolic forms (`5*Sqrt[2]`, `x^3/3`) are
/// carried as text, never coerced to a numeric type.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub text: String,
    pub raw: String,
}

pub type ToolResult = Result<ToolOutput, ToolError>;
