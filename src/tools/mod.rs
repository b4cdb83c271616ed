//! Closed tool surface: identifiers, argument specs, and requests.

use std::{str::FromStr, time::Duration};

use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// The fixed set of operations the bridge exposes. Closed by design:
/// dispatch is a match over this enum, not an open registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Calculate,
    Solve,
    Integrate,
    Differentiate,
    Simplify,
    Factor,
    Expand,
    MatrixOperations,
    Statistics,
    Execute,
    TestConnection,
}

pub const ALL_TOOLS: &[Tool] = &[
    Tool::Calculate,
    Tool::Solve,
    Tool::Integrate,
    Tool::Differentiate,
    Tool::Simplify,
    Tool::Factor,
    Tool::Expand,
    Tool::MatrixOperations,
    Tool::Statistics,
    Tool::Execute,
    Tool::TestConnection,
];

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Calculate => "calculate",
            Tool::Solve => "solve",
            Tool::Integrate => "integrate",
            Tool::Differentiate => "differentiate",
            Tool::Simplify => "simplify",
            Tool::Factor => "factor",
            Tool::Expand => "expand",
            Tool::MatrixOperations => "matrix_operations",
            Tool::Statistics => "statistics",
            Tool::Execute => "execute",
            Tool::TestConnection => "test_connection",
        }
    }

    pub fn required_args(self) -> &'static [&'static str] {
        match self {
            Tool::Calculate | Tool::Simplify | Tool::Factor | Tool::Expand => &["expression"],
            Tool::Solve => &["equation", "variable"],
            Tool::Integrate | Tool::Differentiate => &["expression", "variable"],
            Tool::MatrixOperations => &["matrix", "operation"],
            Tool::Statistics => &["data", "operation"],
            Tool::Execute => &["code"],
            Tool::TestConnection => &[],
        }
    }

    /// JSON schema for the argument object, in the shape tool-calling
    /// protocols expect for discovery.
    pub fn schema(self) -> Value {
        let description = match self {
            Tool::Calculate => "Evaluate a mathematical expression in Wolfram Language syntax",
            Tool::Solve => "Solve an equation for a variable (use == for equality)",
            Tool::Integrate => "Compute an indefinite or definite integral",
            Tool::Differentiate => "Compute a derivative of the given order",
            Tool::Simplify => "Simplify a mathematical expression",
            Tool::Factor => "Factor a mathematical expression",
            Tool::Expand => "Expand a mathematical expression",
            Tool::MatrixOperations => {
                "Apply a named matrix operation (Inverse, Det, Eigenvalues, ...)"
            }
            Tool::Statistics => "Compute a named statistic (Mean, Median, StandardDeviation, ...)",
            Tool::Execute => "Execute arbitrary Wolfram Language code verbatim",
            Tool::TestConnection => "Check that the engine is reachable and licensed",
        };
        let mut properties = serde_json::Map::new();
        for name in self.required_args() {
            properties.insert((*name).into(), arg_schema(self, name));
        }
        match self {
            Tool::Integrate => {
                properties.insert("lower".into(), json!({"type": "string"}));
                properties.insert("upper".into(), json!({"type": "string"}));
            }
            Tool::Differentiate => {
                properties.insert("order".into(), json!({"type": "integer", "minimum": 1}));
            }
            _ => {}
        }
        if self != Tool::Execute && self != Tool::TestConnection {
            properties.insert(
                "decimal".into(),
                json!({"type": "boolean", "description": "Force a decimal approximation"}),
            );
        }
        json!({
            "name": self.name(),
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": self.required_args(),
            }
        })
    }
}

fn arg_schema(tool: Tool, name: &str) -> Value {
    match (tool, name) {
        (Tool::MatrixOperations, "matrix") => json!({
            "type": ["string", "array"],
            "description": "Matrix as a Wolfram literal \"{{1,2},{3,4}}\" or nested JSON array",
        }),
        (Tool::Statistics, "data") => json!({
            "type": ["string", "array"],
            "description": "Data as a Wolfram list \"{1,2,3}\" or a JSON array",
        }),
        _ => json!({"type": "string"}),
    }
}

impl FromStr for Tool {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_TOOLS
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| ToolError::Build {
                name: "tool".into(),
                reason: format!("unknown tool `{s}`"),
            })
    }
}

/// A single tool invocation. Immutable once built.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    tool: Tool,
    args: Map<String, Value>,
    timeout: Option<Duration>,
}

impl ToolRequest {
    pub fn new(tool: Tool, args: Map<String, Value>) -> Self {
        Self { tool, args, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Check that every required argument is present and usable.
    /// Runs before any subprocess is spawned.
    pub fn validate(&self) -> Result<(), ToolError> {
        for name in self.tool.required_args() {
            let missing = match self.args.get(*name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(ToolError::MissingArgument {
                    tool: self.tool.name(),
                    name: (*name).to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in ALL_TOOLS {
            assert_eq!(tool.name().parse::<Tool>().unwrap(), *tool);
        }
    }

    #[test]
    fn unknown_tool_is_a_build_error() {
        let err = "plot".parse::<Tool>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BuildError);
    }

    #[test]
    fn validate_flags_missing_and_blank_arguments() {
        let mut args = Map::new();
        args.insert("equation".into(), Value::String("x == 1".into()));
        let req = ToolRequest::new(Tool::Solve, args.clone());
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { ref name, .. } if name == "variable"));

        args.insert("variable".into(), Value::String("   ".into()));
        let req = ToolRequest::new(Tool::Solve, args);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_connection_needs_no_arguments() {
        let req = ToolRequest::new(Tool::TestConnection, Map::new());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn schemas_list_required_arguments() {
        let schema = Tool::Integrate.schema();
        let required: Vec<&str> = schema["parameters"]["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["expression", "variable"]);
        assert!(schema["parameters"]["properties"]["lower"].is_object());
    }
}
