use jsonschema::JSONSchema;
use log::info;
use serde_json::Value;

use crate::error::ConfigError;

static NOTIFICATION_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/notification.json"));

/// Compile the embedded notification schema
pub fn load_schema() -> Result<JSONSchema, ConfigError> {
    let schema_json: Value = serde_json::from_str(NOTIFICATION_SCHEMA)
        .map_err(|err| ConfigError::Schema(format!("embedded schema is not JSON: {err}")))?;
    compile_schema(&schema_json)
}

fn compile_schema(schema: &Value) -> Result<JSONSchema, ConfigError> {
    info!("Compiling notification config schema");
    JSONSchema::options()
        .compile(schema)
        .map_err(|err| ConfigError::Schema(format!("embedded schema doesn't compile: {err}")))
}

/// Validate an untyped document, collecting every violation into one message
pub fn validate(schema: &JSONSchema, document: &Value) -> Result<(), ConfigError> {
    schema.validate(document).map_err(|errors| {
        let messages: Vec<String> = errors
            .map(|err| format!("{} (at '{}')", err, err.instance_path))
            .collect();
        ConfigError::Schema(messages.join("; "))
    })
}
