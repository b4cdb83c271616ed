//! Code Builder: deterministic (tool, arguments) -> Wolfram Language source.
//!
//! Pure string assembly, no I/O. Caller expressions are opaque text: the
//! builder checks only what it needs to embed them safely (bracket balance,
//! no NUL bytes); real syntax errors surface from the engine's own output.

use serde_json::{Map, Value};

use crate::{error::ToolError, tools::Tool};

/// Longest prefix of the source kept for logs and diagnostics.
pub const DIAGNOSTIC_SOURCE_LIMIT: usize = 512;

/// Fixed probe program: version identity plus a trivial evaluation.
pub const PROBE_SOURCE: &str = "{\"Version\" -> $Version, \"VersionNumber\" -> $VersionNumber, \
     \"SystemID\" -> $SystemID, \"Test\" -> 2 + 2}";

/// Generated engine source plus metadata. Consumed by the invoker and
/// discarded; `truncated` marks that the diagnostic copy was elided.
#[derive(Debug, Clone)]
pub struct EngineProgram {
    pub tool: Tool,
    pub source: String,
    pub truncated: bool,
}

impl EngineProgram {
    fn new(tool: Tool, source: String) -> Self {
        let truncated = source.len() > DIAGNOSTIC_SOURCE_LIMIT;
        Self { tool, source, truncated }
    }

    /// Prefix of the source safe to log; full programs can embed large
    /// caller payloads.
    pub fn diagnostic_source(&self) -> &str {
        if !self.truncated {
            return &self.source;
        }
        let mut end = DIAGNOSTIC_SOURCE_LIMIT;
        while !self.source.is_char_boundary(end) {
            end -= 1;
        }
        &self.source[..end]
    }
}

/// Build the engine program for one tool invocation. Same inputs always
/// produce the same source.
pub fn build(tool: Tool, args: &Map<String, Value>) -> Result<EngineProgram, ToolError> {
    let source = match tool {
        Tool::Calculate => numeric(args, expr(args, tool, "expression")?),
        Tool::Solve => {
            let equation = expr(args, tool, "equation")?;
            let variable = expr(args, tool, "variable")?;
            numeric(args, format!("Solve[{equation}, {variable}]"))
        }
        Tool::Integrate => {
            let expression = expr(args, tool, "expression")?;
            let variable = expr(args, tool, "variable")?;
            let body = match bounds(args, tool)? {
                Some((lower, upper)) => {
                    format!("Integrate[{expression}, {{{variable}, {lower}, {upper}}}]")
                }
                None => format!("Integrate[{expression}, {variable}]"),
            };
            numeric(args, body)
        }
        Tool::Differentiate => {
            let expression = expr(args, tool, "expression")?;
            let variable = expr(args, tool, "variable")?;
            let body = match order(args)? {
                1 => format!("D[{expression}, {variable}]"),
                n => format!("D[{expression}, {{{variable}, {n}}}]"),
            };
            numeric(args, body)
        }
        Tool::Simplify => numeric(args, format!("Simplify[{}]", expr(args, tool, "expression")?)),
        Tool::Factor => numeric(args, format!("Factor[{}]", expr(args, tool, "expression")?)),
        Tool::Expand => numeric(args, format!("Expand[{}]", expr(args, tool, "expression")?)),
        Tool::MatrixOperations => {
            let operation = operation_symbol(args, tool)?;
            let matrix = list(args, tool, "matrix")?;
            numeric(args, format!("{operation}[{matrix}]"))
        }
        Tool::Statistics => {
            let operation = operation_symbol(args, tool)?;
            let data = list(args, tool, "data")?;
            numeric(args, format!("{operation}[{data}]"))
        }
        // Caller code runs verbatim; correctness and safety are on the
        // caller. Only the NUL check applies, since argv cannot carry it.
        Tool::Execute => {
            let code = raw_string(args, tool, "code")?;
            if code.contains('\0') {
                return Err(ToolError::Build {
                    name: "code".into(),
                    reason: "contains a NUL byte".into(),
                });
            }
            code
        }
        Tool::TestConnection => PROBE_SOURCE.to_string(),
    };
    Ok(EngineProgram::new(tool, source))
}

/// Wrap in `N[...]` when the caller asked for a decimal approximation.
fn numeric(args: &Map<String, Value>, body: String) -> String {
    let decimal = match args.get("decimal") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if decimal {
        format!("N[{body}]")
    } else {
        body
    }
}

fn raw_string(
    args: &Map<String, Value>,
    tool: Tool,
    name: &'static str,
) -> Result<String, ToolError> {
    match args.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        // Absent or blank is a missing argument; a present value of the
        // wrong type cannot be embedded and is a build failure.
        None | Some(Value::Null) | Some(Value::String(_)) => {
            Err(ToolError::MissingArgument { tool: tool.name(), name: name.to_string() })
        }
        Some(other) => Err(ToolError::Build {
            name: name.to_string(),
            reason: format!("expected a string or number, got {other}"),
        }),
    }
}

/// Fetch an expression argument and check it can be embedded.
fn expr(args: &Map<String, Value>, tool: Tool, name: &'static str) -> Result<String, ToolError> {
    let text = raw_string(args, tool, name)?;
    check_embeddable(name, &text)?;
    Ok(text)
}

/// Fetch a list-valued argument: either an opaque Wolfram literal string
/// or a (possibly nested) JSON array rendered as `{...}`.
fn list(args: &Map<String, Value>, tool: Tool, name: &'static str) -> Result<String, ToolError> {
    match args.get(name) {
        Some(Value::Array(items)) => render_list(name, items),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            check_embeddable(name, s)?;
            Ok(s.clone())
        }
        None | Some(Value::Null) | Some(Value::String(_)) => {
            Err(ToolError::MissingArgument { tool: tool.name(), name: name.to_string() })
        }
        Some(other) => Err(ToolError::Build {
            name: name.to_string(),
            reason: format!("expected a list literal or array, got {other}"),
        }),
    }
}

fn render_list(name: &str, items: &[Value]) -> Result<String, ToolError> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let rendered = match item {
            Value::Number(n) => n.to_string(),
            Value::Array(inner) => render_list(name, inner)?,
            Value::String(s) => {
                check_embeddable(name, s)?;
                s.clone()
            }
            other => {
                return Err(ToolError::Build {
                    name: name.to_string(),
                    reason: format!("unsupported list element: {other}"),
                })
            }
        };
        parts.push(rendered);
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

/// The operation name becomes a Wolfram head applied to the payload, so
/// it must be a bare symbol, not an expression.
fn operation_symbol(args: &Map<String, Value>, tool: Tool) -> Result<String, ToolError> {
    let text = raw_string(args, tool, "operation")?;
    let text = text.trim().to_string();
    let mut chars = text.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '$');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '`') {
        return Err(ToolError::Build {
            name: "operation".into(),
            reason: format!("`{text}` is not a valid symbol name"),
        });
    }
    Ok(text)
}

fn bounds(args: &Map<String, Value>, tool: Tool) -> Result<Option<(String, String)>, ToolError> {
    let has_lower = args.get("lower").is_some_and(|v| !v.is_null());
    let has_upper = args.get("upper").is_some_and(|v| !v.is_null());
    match (has_lower, has_upper) {
        (false, false) => Ok(None),
        (true, true) => Ok(Some((expr(args, tool, "lower")?, expr(args, tool, "upper")?))),
        (true, false) => {
            Err(ToolError::MissingArgument { tool: tool.name(), name: "upper".into() })
        }
        (false, true) => {
            Err(ToolError::MissingArgument { tool: tool.name(), name: "lower".into() })
        }
    }
}

fn order(args: &Map<String, Value>) -> Result<u64, ToolError> {
    let order = match args.get("order") {
        None | Some(Value::Null) => return Ok(1),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match order {
        Some(n) if n >= 1 => Ok(n),
        _ => Err(ToolError::Build {
            name: "order".into(),
            reason: "must be a positive integer".into(),
        }),
    }
}

fn check_embeddable(name: &str, text: &str) -> Result<(), ToolError> {
    if text.contains('\0') {
        return Err(ToolError::Build {
            name: name.to_string(),
            reason: "contains a NUL byte".into(),
        });
    }
    if !brackets_balanced(text) {
        return Err(ToolError::Build {
            name: name.to_string(),
            reason: "unbalanced brackets".into(),
        });
    }
    Ok(())
}

/// Balance check over `()[]{}`, skipping double-quoted string literals
/// (with backslash escapes) so `"("` never counts as an opener.
fn brackets_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => loop {
                match chars.next() {
                    Some('\\') => {
                        chars.next();
                    }
                    Some('"') => break,
                    Some(_) => {}
                    None => return false,
                }
            },
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}
