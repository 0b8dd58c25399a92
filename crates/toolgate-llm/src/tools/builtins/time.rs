use async_trait::async_trait;
use jiff::Timestamp;
use serde_json::{Map, Value, json};

use crate::tools::error::ToolError;
use crate::tools::handler::ToolHandler;
use crate::types::{FunctionDefinition, ParameterSchema, PropertySchema};

const DEFAULT_TIMEZONE: &str = "UTC";

/// Wall-clock time in an IANA time zone
pub struct GetCurrentTime {
    definition: FunctionDefinition,
}

impl GetCurrentTime {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new().property(
            "timezone",
            PropertySchema::string("IANA time zone name, e.g. Europe/Paris").with_default(Value::from(DEFAULT_TIMEZONE)),
        );

        Self {
            definition: FunctionDefinition::new("get_current_time", "Get the current date and time", parameters),
        }
    }
}

impl Default for GetCurrentTime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for GetCurrentTime {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("tz", "timezone"), ("zone", "timezone")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let timezone = arguments
            .get("timezone")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE);

        let now = Timestamp::now()
            .in_tz(timezone)
            .map_err(|e| ToolError::invalid("timezone", format!("is not a known time zone: {e}")))?;

        Ok(json!({
            "timezone": timezone,
            "datetime": now.strftime("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            "weekday": now.strftime("%A").to_string(),
            "unix": now.timestamp().as_second(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_utc() {
        let value = GetCurrentTime::new().call(Map::new()).await.unwrap();
        assert_eq!(value["timezone"], "UTC");
        assert!(value["datetime"].as_str().unwrap().ends_with("+00:00"));
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected() {
        let arguments = json!({"timezone": "Mars/Olympus_Mons"}).as_object().cloned().unwrap();
        let error = GetCurrentTime::new().call(arguments).await.unwrap_err();
        assert!(matches!(error, ToolError::InvalidArguments(_)));
    }
}
