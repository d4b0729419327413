use regex::Regex;
use serde_json::Value;

/// How a single value is pulled out of a host response body.
///
/// Hosts either answer with JSON, in which case the rule is a
/// [JSON pointer](https://datatracker.ietf.org/doc/html/rfc6901), or with
/// markup/plain text, in which case the rule is a regex whose first capture
/// group (or whole match, if it has none) is the value.
#[derive(Debug, Clone)]
pub enum ResponseRule {
    Json(String),
    Pattern(Regex),
}

impl ResponseRule {
    /// Extract the value this rule points at.
    ///
    /// Returns `None` when the body does not parse, the pointer is absent,
    /// the value is JSON `null`, or the extracted string is empty.
    pub fn extract(&self, body: &str) -> Option<String> {
        let value = match self {
            ResponseRule::Json(pointer) => {
                let doc: Value = serde_json::from_str(body).ok()?;
                json_scalar(doc.pointer(pointer)?)?
            }
            ResponseRule::Pattern(re) => {
                let caps = re.captures(body)?;
                caps.get(1).or_else(|| caps.get(0))?.as_str().to_string()
            }
        };

        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Extract a JSON object of string-ish values, used for extra form fields
    /// returned by a multi-step init call.
    ///
    /// Pattern rules never yield objects.
    pub fn extract_object(&self, body: &str) -> Vec<(String, String)> {
        let ResponseRule::Json(pointer) = self else {
            return Vec::new();
        };
        let Ok(doc) = serde_json::from_str::<Value>(body) else {
            return Vec::new();
        };
        match doc.pointer(pointer) {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| json_scalar(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
