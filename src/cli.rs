use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolRequest};

#[derive(Parser, Debug, Clone)]
#[command(name = "wolfram-bridge", about = "Wolfram Language execution bridge", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Per-call timeout in seconds (default from config, 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Force a decimal approximation instead of an exact symbolic result.
    #[arg(long, global = true)]
    pub decimal: bool,

    /// Override the wolframscript executable path.
    #[arg(long = "script-path", global = true)]
    pub script_path: Option<String>,

    /// Override the kernel executable path.
    #[arg(long = "kernel-path", global = true)]
    pub kernel_path: Option<String>,

    /// Invoke the kernel directly instead of wolframscript.
    #[arg(long = "use-kernel", global = true)]
    pub use_kernel: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Evaluate a mathematical expression.
    Calculate { expression: String },

    /// Solve an equation for a variable (use == for equality).
    Solve { equation: String, variable: String },

    /// Integrate an expression; give both bounds for a definite integral.
    Integrate {
        expression: String,
        variable: String,
        lower: Option<String>,
        upper: Option<String>,
    },

    /// Differentiate an expression.
    Differentiate {
        expression: String,
        variable: String,
        #[arg(long, default_value_t = 1)]
        order: u64,
    },

    /// Simplify an expression.
    Simplify { expression: String },

    /// Factor an expression.
    Factor { expression: String },

    /// Expand an expression.
    Expand { expression: String },

    /// Apply a named matrix operation (Inverse, Det, Eigenvalues, ...).
    MatrixOperations { operation: String, matrix: String },

    /// Compute a named statistic (Mean, Median, StandardDeviation, ...).
    Statistics { operation: String, data: String },

    /// Execute arbitrary Wolfram Language code verbatim.
    Execute { code: String },

    /// Check that the engine is reachable and licensed.
    TestConnection,

    /// Serve JSON-lines tool requests over stdio.
    Serve,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Build the ToolRequest for a one-shot subcommand; `None` for serve.
    pub fn to_request(&self) -> Option<ToolRequest> {
        let (tool, args) = match &self.command {
            Command::Calculate { expression } => {
                (Tool::Calculate, one("expression", expression))
            }
            Command::Solve { equation, variable } => {
                let mut args = one("equation", equation);
                args.insert("variable".into(), json!(variable));
                (Tool::Solve, args)
            }
            Command::Integrate { expression, variable, lower, upper } => {
                let mut args = one("expression", expression);
                args.insert("variable".into(), json!(variable));
                if let Some(lower) = lower {
                    args.insert("lower".into(), json!(lower));
                }
                if let Some(upper) = upper {
                    args.insert("upper".into(), json!(upper));
                }
                (Tool::Integrate, args)
            }
            Command::Differentiate { expression, variable, order } => {
                let mut args = one("expression", expression);
                args.insert("variable".into(), json!(variable));
                args.insert("order".into(), json!(order));
                (Tool::Differentiate, args)
            }
            Command::Simplify { expression } => (Tool::Simplify, one("expression", expression)),
            Command::Factor { expression } => (Tool::Factor, one("expression", expression)),
            Command::Expand { expression } => (Tool::Expand, one("expression", expression)),
            Command::MatrixOperations { operation, matrix } => {
                let mut args = one("matrix", matrix);
                args.insert("operation".into(), json!(operation));
                (Tool::MatrixOperations, args)
            }
            Command::Statistics { operation, data } => {
                let mut args = one("data", data);
                args.insert("operation".into(), json!(operation));
                (Tool::Statistics, args)
            }
            Command::Execute { code } => (Tool::Execute, one("code", code)),
            Command::TestConnection => (Tool::TestConnection, Map::new()),
            Command::Serve => return None,
        };
        let mut args = args;
        if self.decimal {
            args.insert("decimal".into(), json!(true));
        }
        let mut request = ToolRequest::new(tool, args);
        if let Some(secs) = self.timeout {
            request = request.with_timeout(Duration::from_secs(secs.max(1)));
        }
        Some(request)
    }
}

fn one(name: &str, value: &str) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert(name.into(), json!(value));
    args
}
