//! The `calculate` tool.

use std::str::FromStr;

use mcp::CallResult;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::registry::{Arguments, Tool, parse_arguments};
use crate::{Result, ToolError};

pub const TOOL_NAME: &str = "calculate";

const INVALID_OPERATION: &str =
    "Invalid operation specified. Choose 'add', 'subtract', 'multiply', or 'divide'.";
const DIVIDE_BY_ZERO: &str = "Cannot divide by zero";

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(description = "Two numbers and the operation to apply to them")]
pub struct CalculateRequest {
    #[schemars(description = "First operand")]
    pub number1: f64,
    #[schemars(description = "Second operand")]
    pub number2: f64,
    #[schemars(description = "One of 'add', 'subtract', 'multiply', 'divide'")]
    pub operation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl FromStr for Operation {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(Self::Add),
            "subtract" => Ok(Self::Subtract),
            "multiply" => Ok(Self::Multiply),
            "divide" => Ok(Self::Divide),
            _ => Err(ToolError::InvalidArgument(INVALID_OPERATION.to_string())),
        }
    }
}

/// Apply `operation` to the two numbers.
///
/// Division by zero is rejected up front rather than yielding infinity.
pub fn calculate(number1: f64, number2: f64, operation: &str) -> Result<f64> {
    let result = match operation.parse::<Operation>()? {
        Operation::Add => number1 + number2,
        Operation::Subtract => number1 - number2,
        Operation::Multiply => number1 * number2,
        Operation::Divide if number2 == 0.0 => {
            return Err(ToolError::InvalidArgument(DIVIDE_BY_ZERO.to_string()));
        }
        Operation::Divide => number1 / number2,
    };
    Ok(result)
}

pub fn tool() -> Tool {
    Tool::new(
        TOOL_NAME,
        "Performs a calculation based on two numbers and an operation. \
         Supported operations: 'add', 'subtract', 'multiply', 'divide'.",
        |args| async move { handle(args) },
    )
    .with_input::<CalculateRequest>()
}

fn handle(args: Arguments) -> Result<CallResult> {
    let request: CalculateRequest = parse_arguments(args)?;
    tracing::info!(
        number1 = request.number1,
        number2 = request.number2,
        operation = %request.operation,
        "Tool 'calculate' received"
    );

    let result = calculate(request.number1, request.number2, &request.operation)?;
    tracing::info!(result, "Calculation result");
    Ok(CallResult::success(result.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn arithmetic_is_exact() {
        let cases = [
            (10.0, 5.0, "add", 15.0),
            (10.0, 5.0, "subtract", 5.0),
            (10.0, 5.0, "multiply", 50.0),
            (10.0, 4.0, "divide", 2.5),
            (-3.5, 0.5, "divide", -7.0),
            (0.1, 0.2, "add", 0.1 + 0.2),
        ];
        for (a, b, op, expected) in cases {
            assert_eq!(calculate(a, b, op).unwrap(), expected, "{a} {op} {b}");
        }
    }

    #[test]
    fn divide_by_zero_is_rejected() {
        for a in [0.0, 1.0, -42.0, f64::MAX] {
            let err = calculate(a, 0.0, "divide").unwrap_err();
            assert_eq!(err.to_string(), "Cannot divide by zero");
        }
        // Negative zero compares equal to zero.
        assert!(calculate(1.0, -0.0, "divide").is_err());
    }

    #[test]
    fn unsupported_operation_is_rejected() {
        let err = calculate(10.0, 5.0, "modulo").unwrap_err();
        assert!(err.to_string().starts_with("Invalid operation specified"));
    }

    #[test]
    fn zero_is_fine_for_other_operations() {
        assert_eq!(calculate(10.0, 0.0, "multiply").unwrap(), 0.0);
        assert_eq!(calculate(10.0, 0.0, "add").unwrap(), 10.0);
    }

    #[test]
    fn handler_formats_result_as_text() {
        let add = json!({"number1": 10, "number2": 5, "operation": "add"});
        let result = handle(args(add)).unwrap();
        assert_eq!(result, CallResult::success("15"));

        let divide = json!({"number1": 10, "number2": 4, "operation": "divide"});
        let result = handle(args(divide)).unwrap();
        assert_eq!(result, CallResult::success("2.5"));
    }

    #[test]
    fn missing_arguments_are_invalid() {
        let err = handle(args(json!({"number1": 10, "operation": "add"}))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
        assert!(err.to_string().contains("number2"));
    }
}
