use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};

use super::{f64_arg, str_arg};
use crate::tools::error::ToolError;
use crate::tools::handler::ToolHandler;
use crate::types::{FunctionDefinition, ParameterSchema, PropertySchema};

/// Basic arithmetic on two operands
pub struct Calculate {
    definition: FunctionDefinition,
}

impl Calculate {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new()
            .property(
                "operation",
                PropertySchema::string("Arithmetic operation").with_enum(&["add", "subtract", "multiply", "divide", "power"]),
            )
            .property("a", PropertySchema::number("First operand"))
            .property("b", PropertySchema::number("Second operand"))
            .required(&["operation", "a", "b"]);

        Self {
            definition: FunctionDefinition::new("calculate", "Perform a basic arithmetic operation on two numbers", parameters),
        }
    }
}

impl Default for Calculate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for Calculate {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("op", "operation"), ("x", "a"), ("y", "b"), ("num1", "a"), ("num2", "b")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let operation = str_arg(&arguments, "operation")?;
        let a = f64_arg(&arguments, "a")?;
        let b = f64_arg(&arguments, "b")?;

        let result = match operation {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" if b.abs() > 0.0 => a / b,
            "divide" => return Err(ToolError::execution("division by zero")),
            "power" => a.powf(b),
            other => return Err(ToolError::invalid("operation", format!("unsupported operation `{other}`"))),
        };

        let result = Number::from_f64(result).ok_or_else(|| ToolError::execution("result is not a finite number"))?;

        Ok(json!({
            "operation": operation,
            "a": a,
            "b": b,
            "result": result,
        }))
    }
}
