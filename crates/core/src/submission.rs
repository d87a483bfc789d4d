use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Values captured from one submitted form, keyed by form field id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionValues {
    values: BTreeMap<String, String>,
}

impl SubmissionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field_id, value);
        self
    }

    pub fn insert(&mut self, field_id: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field_id.into(), value.into());
    }

    /// Missing fields read as empty; the form UI owns required-ness.
    pub fn get(&self, field_id: &str) -> &str {
        self.values.get(field_id).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.values.contains_key(field_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for SubmissionValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (field_id, value) in iter {
            values.insert(field_id, value);
        }
        values
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittingUser {
    /// Chat user id; also the target of the direct-message reply.
    pub id: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::SubmissionValues;

    #[test]
    fn missing_fields_read_as_empty() {
        let values = SubmissionValues::new().with("title", "Login broken");

        assert_eq!(values.get("title"), "Login broken");
        assert_eq!(values.get("description"), "");
        assert!(!values.contains("description"));
    }

    #[test]
    fn collects_from_pairs() {
        let values: SubmissionValues = [("type", "Bug"), ("title", "Crash")].into_iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("type"), "Bug");
    }
}
