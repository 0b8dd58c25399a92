//! Built-ins that answer with deterministic, locally generated data

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use super::str_arg;
use crate::tools::error::ToolError;
use crate::tools::handler::ToolHandler;
use crate::types::{FunctionDefinition, ParameterSchema, PropertySchema};

const CONDITIONS: &[&str] = &["sunny", "partly cloudy", "overcast", "light rain", "showers", "windy", "foggy"];

const MAX_SEARCH_RESULTS: u64 = 10;

/// Stable bytes derived from the inputs, so repeated calls agree
fn seed(parts: &[&str]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.trim().to_lowercase().as_bytes());
        hasher.update([0]);
    }
    let mut bytes = [0; 32];
    bytes.copy_from_slice(&hasher.finalize());
    bytes
}

// -- get_weather --

pub struct GetWeather {
    definition: FunctionDefinition,
}

impl GetWeather {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new()
            .property("location", PropertySchema::string("City or place name"))
            .property(
                "units",
                PropertySchema::string("Temperature units")
                    .with_enum(&["celsius", "fahrenheit"])
                    .with_default(Value::from("celsius")),
            )
            .required(&["location"]);

        Self {
            definition: FunctionDefinition::new("get_weather", "Get the current weather for a location", parameters),
        }
    }
}

impl Default for GetWeather {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for GetWeather {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("city", "location"), ("place", "location"), ("unit", "units")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let location = str_arg(&arguments, "location")?;
        let units = arguments.get("units").and_then(Value::as_str).unwrap_or("celsius");
        let bytes = seed(&[location]);

        let celsius = i64::from(bytes[0] % 36) - 5;
        let temperature = if units == "fahrenheit" { celsius * 9 / 5 + 32 } else { celsius };

        Ok(json!({
            "location": location,
            "temperature": temperature,
            "units": units,
            "conditions": CONDITIONS[usize::from(bytes[1]) % CONDITIONS.len()],
            "humidity": 30 + u64::from(bytes[2] % 60),
            "simulated": true,
        }))
    }
}

// -- web_search --

pub struct WebSearch {
    definition: FunctionDefinition,
}

impl WebSearch {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new()
            .property("query", PropertySchema::string("Search query"))
            .property(
                "max_results",
                PropertySchema::integer("Number of results to return").with_default(Value::from(3)),
            )
            .required(&["query"]);

        Self {
            definition: FunctionDefinition::new("web_search", "Search the web for information", parameters),
        }
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WebSearch {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("q", "query"), ("term", "query"), ("search", "query"), ("input", "query")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let query = str_arg(&arguments, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::invalid("query", "must not be empty"));
        }

        let count = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(3)
            .clamp(1, MAX_SEARCH_RESULTS);
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();

        let results: Vec<Value> = (1..=count)
            .map(|rank| {
                json!({
                    "title": format!("{query} (result {rank})"),
                    "url": format!("https://search.example.com/?q={encoded}&rank={rank}"),
                    "snippet": format!("Simulated result {rank} for \"{query}\"."),
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "results": results,
            "simulated": true,
        }))
    }
}

// -- lookup_record --

pub struct LookupRecord {
    definition: FunctionDefinition,
}

impl LookupRecord {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new()
            .property("table", PropertySchema::string("Table or collection name"))
            .property("id", PropertySchema::string("Record identifier"))
            .required(&["table", "id"]);

        Self {
            definition: FunctionDefinition::new("lookup_record", "Look up a record by table and id", parameters),
        }
    }
}

impl Default for LookupRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for LookupRecord {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("collection", "table"), ("record_id", "id"), ("key", "id")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let table = str_arg(&arguments, "table")?;
        let id = str_arg(&arguments, "id")?;
        let bytes = seed(&[table, id]);

        Ok(json!({
            "table": table,
            "id": id,
            "found": true,
            "record": {
                "id": id,
                "name": format!("{table} {id}"),
                "status": if bytes[0] % 4 == 0 { "inactive" } else { "active" },
            },
            "simulated": true,
        }))
    }
}

// -- send_email --

pub struct SendEmail {
    definition: FunctionDefinition,
}

impl SendEmail {
    pub fn new() -> Self {
        let parameters = ParameterSchema::new()
            .property("to", PropertySchema::string("Recipient email address"))
            .property("subject", PropertySchema::string("Email subject"))
            .property("message", PropertySchema::string("Email body"))
            .required(&["to", "subject", "message"]);

        Self {
            definition: FunctionDefinition::new("send_email", "Send an email message", parameters),
        }
    }
}

impl Default for SendEmail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for SendEmail {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("recipient", "to"), ("email", "to"), ("body", "message"), ("content", "message"), ("title", "subject")]
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let to = str_arg(&arguments, "to")?.trim();
        if !to.contains('@') {
            return Err(ToolError::invalid("to", "must be an email address"));
        }
        let subject = str_arg(&arguments, "subject")?;

        Ok(json!({
            "status": "queued",
            "message_id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
            "to": to,
            "subject": subject,
            "simulated": true,
        }))
    }
}
