//! Catalog resources exposed as MCP resource descriptors and text contents

use rust_mcp_sdk::schema::{ReadResourceContent, ReadResourceResult, Resource, TextResourceContents};
use serde_json::{json, Value};

use crate::domain::catalog::{CatalogOptions, ResourceEntry};
use crate::mcp::rpc::{ErrorObject, SERVER_ERROR};

pub const RESOURCE_NOT_FOUND: i64 = -32002;

pub fn describe(entry: &ResourceEntry) -> Resource {
    Resource {
        annotations: None,
        description: entry.description.clone(),
        icons: vec![],
        meta: None,
        mime_type: Some(entry.mime_type.clone()),
        name: entry.name.clone(),
        size: None,
        title: None,
        uri: entry.uri.clone(),
    }
}

pub fn build_resources_list(catalog: &CatalogOptions) -> Result<Vec<Value>, ErrorObject> {
    catalog
        .resources
        .iter()
        .map(|entry| {
            serde_json::to_value(describe(entry))
                .map_err(|err| ErrorObject::new(SERVER_ERROR, format!("resource descriptor: {err}")))
        })
        .collect()
}

pub fn read_resource(catalog: &CatalogOptions, uri: &str) -> Result<Value, ErrorObject> {
    let Some(entry) = catalog.resource(uri) else {
        return Err(
            ErrorObject::new(RESOURCE_NOT_FOUND, format!("Resource not found: {uri}")).with_data(
                json!({
                    "code": "resource_not_found",
                    "details": { "uri": uri },
                }),
            ),
        );
    };

    let result = ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some(entry.mime_type.clone()),
            text: entry.text.clone(),
            uri: entry.uri.clone(),
        })],
        meta: None,
    };

    serde_json::to_value(result)
        .map_err(|err| ErrorObject::new(SERVER_ERROR, format!("resource contents: {err}")))
}
