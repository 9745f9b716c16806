//! Request parameters.
//!
//! Values come from the query string and, for POST/PUT, a form-encoded
//! body. Body values win over query values. An empty value is treated the
//! same as a missing one.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges query and body values, body first.
    pub fn merged(query: HashMap<String, String>, body: HashMap<String, String>) -> Self {
        let mut values = query;
        values.extend(body);
        Self { values }
    }

    /// The value of `name`, if present and non-empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn value(&self) -> Option<&str> {
        self.get("value")
    }

    pub fn field(&self) -> Option<&str> {
        self.get("field")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
