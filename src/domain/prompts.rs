//! Prompt templates rendered on request

use serde_json::{json, Value};

use crate::domain::catalog::{CatalogOptions, PromptEntry};
use crate::mcp::{handler::Params, rpc::ErrorObject};

pub fn describe(entry: &PromptEntry) -> Value {
    json!({
        "name": entry.name,
        "description": entry.description,
        "arguments": entry
            .arguments
            .iter()
            .map(|name| json!({ "name": name, "required": true }))
            .collect::<Vec<_>>(),
    })
}

pub fn build_prompts_list(catalog: &CatalogOptions) -> Vec<Value> {
    catalog.prompts.iter().map(describe).collect()
}

pub fn render_prompt(
    catalog: &CatalogOptions,
    name: &str,
    params: &Params,
) -> Result<Value, ErrorObject> {
    let Some(prompt) = catalog.prompt(name) else {
        return Err(ErrorObject::invalid_params(format!("unknown prompt {name}"))
            .with_data(json!({ "code": "prompt_not_found", "details": { "name": name } })));
    };

    let arguments = params.get("arguments").and_then(Value::as_object);
    let mut text = prompt.template.clone();
    for argument in &prompt.arguments {
        let Some(value) = arguments
            .and_then(|arguments| arguments.get(argument))
            .and_then(Value::as_str)
        else {
            return Err(ErrorObject::invalid_params(format!(
                "prompt {name} requires string argument {argument}"
            )));
        };
        text = text.replace(&format!("{{{{{argument}}}}}"), value);
    }

    Ok(json!({
        "description": prompt.description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::rpc::INVALID_PARAMS;

    fn params(value: Value) -> Params {
        value.as_object().cloned().expect("object params")
    }

    #[test]
    fn describes_required_arguments() {
        let listed = build_prompts_list(&CatalogOptions::default());
        assert_eq!(listed[0]["name"], "summarize");
        assert_eq!(listed[0]["arguments"][0], json!({"name": "text", "required": true}));
    }

    #[test]
    fn substitutes_arguments() {
        let rendered = render_prompt(
            &CatalogOptions::default(),
            "summarize",
            &params(json!({"promptId": "summarize", "arguments": {"text": "Rust is fast."}})),
        )
        .expect("prompt renders");

        let text = rendered["messages"][0]["content"]["text"]
            .as_str()
            .expect("text content");
        assert!(text.ends_with("Rust is fast."));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn missing_argument_is_invalid_params() {
        let error = render_prompt(
            &CatalogOptions::default(),
            "summarize",
            &params(json!({"promptId": "summarize"})),
        )
        .expect_err("argument is required");

        assert_eq!(error.code, INVALID_PARAMS);
    }

    #[test]
    fn unknown_prompt_is_invalid_params() {
        let error = render_prompt(&CatalogOptions::default(), "nope", &Params::new())
            .expect_err("unknown prompt");
        assert_eq!(error.code, INVALID_PARAMS);
    }
}
