use once_cell::sync::Lazy;
use regex::Regex;

static INPUT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").ok());
static ATTR: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?is)\b([a-z_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).ok()
});

/// Name/value pairs of every `<input type="hidden">` in `markup`, in document order.
pub fn hidden_fields(markup: &str) -> Vec<(String, String)> {
    let (Some(input), Some(attr)) = (INPUT.as_ref(), ATTR.as_ref()) else {
        return Vec::new();
    };

    input
        .find_iter(markup)
        .filter_map(|tag| {
            let mut kind = None;
            let mut name = None;
            let mut value = String::new();
            for caps in attr.captures_iter(tag.as_str()) {
                let key = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
                let val = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                match key.as_deref() {
                    Some("type") => kind = Some(val.to_ascii_lowercase()),
                    Some("name") => name = Some(val),
                    Some("value") => value = val,
                    _ => {}
                }
            }
            (kind.as_deref() == Some("hidden")).then_some(())?;
            Some((name?, value))
        })
        .collect()
}
