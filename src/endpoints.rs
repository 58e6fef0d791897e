use serde_json::Value;

/// Ordered label -> base URL mapping parsed from the `BASE_URL` setting.
/// Insertion order is the display order and the first label is the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointMap {
    entries: Vec<(String, String)>,
}

impl EndpointMap {
    /// Never fails: anything other than a JSON object whose values are all
    /// non-empty strings (keyed by non-empty labels) yields an empty map.
    pub fn parse(raw: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };

        let mut entries = Vec::with_capacity(object.len());
        for (label, value) in object {
            match value {
                Value::String(url) if !label.is_empty() && !url.is_empty() => {
                    entries.push((label, url));
                }
                _ => return Self::default(),
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn default_label(&self) -> Option<&str> {
        self.entries.first().map(|(label, _)| label.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, u)| (l.as_str(), u.as_str()))
    }

    pub fn base_url(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, url)| url.as_str())
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|(l, _)| l == label)
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(l, _)| l.as_str())
    }

    /// Base URL for `label` with relative paths anchored on `api_server`.
    /// Unknown labels resolve to the empty string.
    pub fn resolve_base_url(&self, label: &str, api_server: &str) -> String {
        let Some(base) = self.base_url(label) else {
            return String::new();
        };
        if base.starts_with('/') && !api_server.is_empty() {
            format!("{}{}", api_server.trim_end_matches('/'), base)
        } else {
            base.to_string()
        }
    }
}
