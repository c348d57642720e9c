//! Tool-list rewriting for multi-instance routing.
//!
//! Workers advertise their tools without knowing a gateway sits in front of
//! them. Before a `tools/list` reply reaches the client every tool gains an
//! optional `binary` argument, and the gateway's own `list_instances` tool is
//! appended.

use crate::config::GatewayConfig;
use serde_json::{json, Value};

const SELECTOR_DESCRIPTION: &str = "Target binary (name like 'binary.exe', sha256 hash, or path). \
     Use list_instances to see available binaries.";

const LIST_INSTANCES_DESCRIPTION: &str =
    "List all connected IDA Pro instances with their binary information";

/// Descriptor of the gateway-local `list_instances` tool.
pub fn list_instances_tool() -> Value {
    list_instances_tool_with(LIST_INSTANCES_DESCRIPTION.to_string())
}

fn list_instances_tool_with(description: String) -> Value {
    json!({
        "name": GatewayConfig::LIST_INSTANCES_TOOL,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {},
            "required": [],
        },
    })
}

/// Result payload for `tools/list` when no worker is reachable.
pub fn empty_tool_list() -> Value {
    let description = format!(
        "{}. No IDA instances are currently connected.",
        LIST_INSTANCES_DESCRIPTION
    );
    json!({ "tools": [list_instances_tool_with(description)] })
}

/// Schema of the selector argument added to every worker tool.
fn selector_property() -> Value {
    json!({
        "type": "string",
        "description": SELECTOR_DESCRIPTION,
    })
}

/// Add the selector argument to each tool and append `list_instances` once.
///
/// Replies without `result.tools` (errors, other shapes) pass through
/// untouched. Applying this twice yields the same value as applying it once.
pub fn augment_tool_list(mut response: Value) -> Value {
    if let Some(tools) = response
        .get_mut("result")
        .and_then(|result| result.get_mut("tools"))
        .and_then(Value::as_array_mut)
    {
        augment_tools(tools);
    }
    response
}

fn augment_tools(tools: &mut Vec<Value>) {
    for tool in tools.iter_mut() {
        if let Some(properties) = tool
            .get_mut("inputSchema")
            .and_then(|schema| schema.get_mut("properties"))
            .and_then(Value::as_object_mut)
        {
            properties.insert(GatewayConfig::SELECTOR_PARAM.to_string(), selector_property());
        }
    }

    let already_listed = tools
        .iter()
        .any(|tool| tool.get("name").and_then(Value::as_str) == Some(GatewayConfig::LIST_INSTANCES_TOOL));
    if !already_listed {
        tools.push(list_instances_tool());
    }
}
