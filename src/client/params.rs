use serde_json::Value;
use url::Url;

/// A single query value before it is written into a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Scalar(String),
    /// Written as one `key=value` pair per element.
    List(Vec<String>),
    /// Nested structures travel as a single JSON-encoded value.
    Json(Value),
}

/// Ordered query parameters. Absent values are never written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pairs: Vec<(String, QueryValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs
            .push((key.to_string(), QueryValue::Scalar(value.to_string())));
        self
    }

    #[must_use]
    pub fn push_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    #[must_use]
    pub fn push_list<I, V>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.pairs.push((key.to_string(), QueryValue::List(values)));
        self
    }

    #[must_use]
    pub fn push_json(mut self, key: &str, value: Value) -> Self {
        self.pairs.push((key.to_string(), QueryValue::Json(value)));
        self
    }

    /// Returns a copy with `page-token` set, or unchanged when `token` is `None`.
    #[must_use]
    pub fn with_page_token(&self, token: Option<&str>) -> Self {
        self.clone().push_opt("page-token", token)
    }

    /// Builds parameters from a JSON object: `null` is dropped, arrays repeat
    /// the key, nested objects are JSON-encoded into one value.
    pub fn from_json(object: &Value) -> Self {
        let mut params = Self::new();
        let Some(map) = object.as_object() else {
            return params;
        };

        for (key, value) in map {
            params = match value {
                Value::Null => params,
                Value::Array(values) => params.push_list(key, values.iter().map(scalar_text)),
                Value::Object(_) => params.push_json(key, value.clone()),
                other => params.push(key, scalar_text(other)),
            };
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn append_to(&self, url: &mut Url) {
        if self.pairs.is_empty() {
            return;
        }

        let mut query = url.query_pairs_mut();
        for (key, value) in &self.pairs {
            match value {
                QueryValue::Scalar(v) => {
                    query.append_pair(key, v);
                }
                QueryValue::List(values) => {
                    for v in values {
                        query.append_pair(key, v);
                    }
                }
                QueryValue::Json(v) => {
                    query.append_pair(key, &v.to_string());
                }
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
