use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Form(Vec<(String, String)>),
    Json(Map<String, Value>),
}

/// A plain HTTP request, independent of any client library.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Switch the body to JSON, carrying over any fields already set.
    #[must_use]
    pub fn json(mut self) -> Self {
        let map = match std::mem::take(&mut self.body) {
            RequestBody::Json(map) => map,
            RequestBody::Form(pairs) => pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
            RequestBody::Empty => Map::new(),
        };
        self.body = RequestBody::Json(map);
        self
    }

    /// Add a parameter where this request carries its parameters: the query
    /// string for `GET`, the body otherwise.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if self.method == Method::Get {
            self.query.push((name, value));
            return self;
        }
        match &mut self.body {
            RequestBody::Json(map) => {
                map.insert(name, Value::String(value));
            }
            RequestBody::Form(pairs) => pairs.push((name, value)),
            RequestBody::Empty => self.body = RequestBody::Form(vec![(name, value)]),
        }
        self
    }

    #[must_use]
    pub fn fields<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |req, (k, v)| req.field(k, v))
    }

    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a body or query parameter.
    pub fn field_value(&self, name: &str) -> Option<String> {
        let from_body = match &self.body {
            RequestBody::Form(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone()),
            RequestBody::Json(map) => map.get(name).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            RequestBody::Empty => None,
        };
        from_body.or_else(|| {
            self.query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }
}

/// A multipart upload of one local file, plus the text fields sent alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl FileUpload {
    /// Turn a prepared `POST` request into a multipart upload. Body fields
    /// become text parts.
    pub fn new(
        request: HttpRequest,
        file_field: impl Into<String>,
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        size: u64,
    ) -> Self {
        let fields = match request.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Form(pairs) => pairs,
            RequestBody::Json(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
        };
        Self {
            url: request.url,
            query: request.query,
            headers: request.headers,
            fields,
            file_field: file_field.into(),
            path: path.into(),
            file_name: file_name.into(),
            size,
        }
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Cookies set by the response, including those set along redirects.
    pub cookies: BTreeMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            cookies: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_fields_land_in_query() {
        let req = HttpRequest::get("https://h/x").field("token", "t");
        assert_eq!(req.query, vec![("token".to_string(), "t".to_string())]);
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn post_fields_land_in_body() {
        let req = HttpRequest::post("https://h/x").field("a", "1").field("b", "2");
        assert_eq!(req.field_value("b").as_deref(), Some("2"));
        assert!(req.query.is_empty());
    }

    #[test]
    fn json_switch_keeps_existing_fields() {
        let req = HttpRequest::post("https://h/x").field("a", "1").json().field("b", "2");
        let RequestBody::Json(map) = &req.body else {
            panic!("expected json body");
        };
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn upload_takes_body_fields_as_parts() {
        let req = HttpRequest::post("https://h/up")
            .header("X-Key", "k")
            .field("gallery_id", "g1");
        let upload = FileUpload::new(req, "file", "/tmp/a.jpg", "a.jpg", 10);
        assert_eq!(upload.field_value("gallery_id"), Some("g1"));
        assert_eq!(upload.headers.len(), 1);
    }
}
