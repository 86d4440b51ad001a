//! Redaction of request data before it reaches operator logs

use serde_json::Value;

const REDACTED: &str = "[REDACTED]";

pub fn redact_params(params: Option<&Value>) -> Value {
    params.map(redact_value).unwrap_or(Value::Null)
}

pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    let item = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(item)
                    };
                    (key.clone(), item)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        _ => value.clone(),
    }
}

/// Header list with sensitive values masked, rendered for a single log field.
pub fn redact_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_key(name) || name.eq_ignore_ascii_case("cookie") {
                format!("{name}={REDACTED}")
            } else {
                format!("{name}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey" | "x-api-key"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn redacts_nested_sensitive_fields() {
        let params = json!({
            "toolId": "echo",
            "arguments": {
                "text": "hello",
                "access_token": "should-not-appear",
                "nested": [{"client_secret": "should-not-appear"}]
            }
        });

        let redacted = redact_params(Some(&params));

        assert_eq!(redacted["toolId"], json!("echo"));
        assert_eq!(redacted["arguments"]["text"], json!("hello"));
        assert_eq!(redacted["arguments"]["access_token"], json!(REDACTED));
        assert_eq!(
            redacted["arguments"]["nested"][0]["client_secret"],
            json!(REDACTED)
        );
    }

    #[test]
    fn missing_params_log_as_null() {
        assert_eq!(redact_params(None), Value::Null);
    }

    #[test]
    fn masks_authorization_and_cookie_headers() {
        let rendered = redact_headers(&[
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("cookie".to_string(), "sid=1".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ]);

        assert_eq!(
            rendered,
            "Authorization=[REDACTED], cookie=[REDACTED], accept=application/json"
        );
    }
}
