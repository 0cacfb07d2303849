//! `calculate`: binary arithmetic on two numbers.
//!
//! Operands are coerced to `f64`; JSON numbers and numeric strings are
//! accepted. Division or modulo by zero and non-finite results are
//! rejected as `MATH_ERROR` since JSON cannot carry infinities or NaN.

use super::{field, CommandHandler, Context};
use crate::protocol::{CommandError, CommandResult, Data, ErrorCode};
use serde_json::{json, Value};

/// Supported arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulo,
}

impl Operation {
    const NAMES: &'static str = "add, subtract, multiply, divide, power, modulo";

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Operation::Add),
            "subtract" => Some(Operation::Subtract),
            "multiply" => Some(Operation::Multiply),
            "divide" => Some(Operation::Divide),
            "power" => Some(Operation::Power),
            "modulo" => Some(Operation::Modulo),
            _ => None,
        }
    }

    /// Apply the operation, rejecting undefined or non-finite results.
    pub fn apply(self, a: f64, b: f64) -> Result<f64, CommandError> {
        let result = match self {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => {
                if b == 0.0 {
                    return Err(CommandError::new(ErrorCode::MathError, "Division by zero"));
                }
                a / b
            }
            Operation::Power => a.powf(b),
            Operation::Modulo => {
                if b == 0.0 {
                    return Err(CommandError::new(ErrorCode::MathError, "Modulo by zero"));
                }
                floored_rem(a, b)
            }
        };

        if result.is_finite() {
            Ok(result)
        } else {
            Err(CommandError::new(
                ErrorCode::MathError,
                format!("Result of {:?}({a}, {b}) is not a finite number", self),
            ))
        }
    }
}

/// Remainder whose sign follows the divisor.
fn floored_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn operand(data: &Data, name: &str) -> Result<f64, CommandError> {
    let parsed = match field(data, name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        CommandError::invalid_input(format!("'{name}' field is required and must be a number"))
    })
}

pub struct Calculate;

impl CommandHandler for Calculate {
    fn description(&self) -> &'static str {
        "Perform a mathematical operation on two numbers"
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            (
                "operation",
                "One of: add, subtract, multiply, divide, power, modulo",
            ),
            ("a", "First operand (number)"),
            ("b", "Second operand (number)"),
        ]
    }

    fn handle(&self, data: &Data, _ctx: &Context<'_>) -> CommandResult {
        let name = field(data, "operation")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CommandError::invalid_input("'operation' field is required and must be a string")
            })?;
        let a = operand(data, "a")?;
        let b = operand(data, "b")?;

        let operation = Operation::parse(name).ok_or_else(|| {
            CommandError::new(
                ErrorCode::InvalidOperation,
                format!(
                    "Unknown operation '{name}'. Supported: {}",
                    Operation::NAMES
                ),
            )
        })?;

        let result = operation.apply(a, b)?;
        Ok(json!({
            "operation": name,
            "a": a,
            "b": b,
            "result": result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::run;
    use crate::commands::CommandKind;
    use crate::storage::Storage;

    fn calc(data: Value) -> CommandResult {
        run(&Storage::new(), CommandKind::Calculate, data)
    }

    #[test]
    fn test_add() {
        let result = calc(json!({"operation": "add", "a": 2, "b": 3})).unwrap();
        assert_eq!(result["result"].as_f64(), Some(5.0));
        assert_eq!(result["operation"], "add");
        assert_eq!(result["a"].as_f64(), Some(2.0));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let result = calc(json!({"operation": "multiply", "a": "2.5", "b": " 4 "})).unwrap();
        assert_eq!(result["result"].as_f64(), Some(10.0));
    }

    #[test]
    fn test_all_operations() {
        let cases = [
            ("subtract", 7.0, 10.0, -3.0),
            ("divide", 9.0, 2.0, 4.5),
            ("power", 2.0, 10.0, 1024.0),
            ("modulo", 7.0, 3.0, 1.0),
        ];
        for (op, a, b, expected) in cases {
            let result = calc(json!({"operation": op, "a": a, "b": b})).unwrap();
            assert_eq!(result["result"].as_f64(), Some(expected), "{op}");
        }
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        assert_eq!(floored_rem(-7.0, 3.0), 2.0);
        assert_eq!(floored_rem(7.0, -3.0), -2.0);
        assert_eq!(floored_rem(-7.0, -3.0), -1.0);
        assert_eq!(floored_rem(6.0, -3.0), 0.0);
    }

    #[test]
    fn test_division_and_modulo_by_zero() {
        for op in ["divide", "modulo"] {
            let err = calc(json!({"operation": op, "a": 1, "b": 0})).unwrap_err();
            assert_eq!(err.code, ErrorCode::MathError, "{op}");
            let err = calc(json!({"operation": op, "a": 1, "b": "0.0"})).unwrap_err();
            assert_eq!(err.code, ErrorCode::MathError, "{op}");
        }
    }

    #[test]
    fn test_non_finite_power_rejected() {
        let err = calc(json!({"operation": "power", "a": 0, "b": -1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MathError);

        let err = calc(json!({"operation": "power", "a": 10, "b": 400})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MathError);

        let err = calc(json!({"operation": "power", "a": -8, "b": 0.5})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MathError);
    }

    #[test]
    fn test_invalid_inputs() {
        for data in [
            json!({"a": 1, "b": 2}),
            json!({"operation": "add", "b": 2}),
            json!({"operation": "add", "a": "two", "b": 2}),
            json!({"operation": "add", "a": true, "b": 2}),
            json!({"operation": "add", "a": 1, "b": null}),
        ] {
            let err = calc(data.clone()).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidInput, "{data}");
        }
    }

    #[test]
    fn test_unknown_operation() {
        let err = calc(json!({"operation": "sqrt", "a": 1, "b": 2})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperation);
        assert!(err.message.contains("sqrt"));
    }
}
