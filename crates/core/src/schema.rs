use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Typed view of one property definition in a record-store collection.
///
/// Only the variants the form and record mapping care about carry data; every
/// other property type collapses into `Other` with its wire name preserved for
/// logging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyDescriptor {
    Title,
    RichText,
    Date,
    Select { options: Vec<String> },
    MultiSelect { options: Vec<String> },
    Status { options: Vec<String> },
    Other { kind: String },
}

impl PropertyDescriptor {
    pub fn kind(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::RichText => "rich_text",
            Self::Date => "date",
            Self::Select { .. } => "select",
            Self::MultiSelect { .. } => "multi_select",
            Self::Status { .. } => "status",
            Self::Other { kind } => kind,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionSchema {
    pub collection_id: String,
    properties: HashMap<String, PropertyDescriptor>,
}

impl CollectionSchema {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self { collection_id: collection_id.into(), properties: HashMap::new() }
    }

    pub fn with_property(mut self, name: impl Into<String>, descriptor: PropertyDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: PropertyDescriptor) {
        self.properties.insert(name.into(), descriptor);
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    pub fn property_names(&self) -> Vec<&str> {
        let mut names = self.properties.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
