//! Notion JSON shapes for database retrieval and page creation.

use std::collections::HashMap;

use intake_core::config::ParentStyle;
use intake_core::{CollectionSchema, PropertyDescriptor, PropertyValue, RecordDraft};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Notion rejects rich text items longer than this many characters.
pub const RICH_TEXT_CHUNK_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct DatabaseResponse {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub select: Option<OptionList>,
    #[serde(default)]
    pub multi_select: Option<OptionList>,
    #[serde(default)]
    pub status: Option<OptionList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OptionList {
    #[serde(default)]
    pub options: Vec<NamedOption>,
}

#[derive(Debug, Deserialize)]
pub struct NamedOption {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PageResponse {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl PropertyDefinition {
    fn into_descriptor(self) -> PropertyDescriptor {
        let names = |list: Option<OptionList>| -> Vec<String> {
            list.unwrap_or_default().options.into_iter().map(|option| option.name).collect()
        };

        match self.kind.as_str() {
            "title" => PropertyDescriptor::Title,
            "rich_text" => PropertyDescriptor::RichText,
            "date" => PropertyDescriptor::Date,
            "select" => PropertyDescriptor::Select { options: names(self.select) },
            "multi_select" => PropertyDescriptor::MultiSelect { options: names(self.multi_select) },
            "status" => PropertyDescriptor::Status { options: names(self.status) },
            _ => PropertyDescriptor::Other { kind: self.kind },
        }
    }
}

impl DatabaseResponse {
    pub fn into_schema(self) -> CollectionSchema {
        let mut schema = CollectionSchema::new(self.id);
        for (name, definition) in self.properties {
            schema.insert(name, definition.into_descriptor());
        }
        schema
    }
}

pub fn parent(style: ParentStyle, database_id: &str) -> Value {
    match style {
        ParentStyle::DatabaseId => json!({ "database_id": database_id }),
        ParentStyle::Typed => json!({ "type": "database_id", "database_id": database_id }),
    }
}

pub fn property_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(text) => json!({ "title": text_items(text) }),
        PropertyValue::RichText(text) => json!({ "rich_text": text_items(text) }),
        PropertyValue::Select(name) if name.is_empty() => json!({ "select": null }),
        PropertyValue::Select(name) => json!({ "select": { "name": name } }),
        PropertyValue::Date(date) => {
            json!({ "date": { "start": date.format("%Y-%m-%d").to_string() } })
        }
    }
}

pub fn create_page_body(style: ParentStyle, database_id: &str, draft: &RecordDraft) -> Value {
    let properties = draft
        .properties()
        .map(|(name, value)| (name.to_owned(), property_value(value)))
        .collect::<Map<_, _>>();

    json!({
        "parent": parent(style, database_id),
        "properties": properties,
    })
}

fn text_items(text: &str) -> Vec<Value> {
    if text.is_empty() {
        return vec![json!({ "text": { "content": "" } })];
    }

    let chars = text.chars().collect::<Vec<_>>();
    chars
        .chunks(RICH_TEXT_CHUNK_CHARS)
        .map(|chunk| json!({ "text": { "content": chunk.iter().collect::<String>() } }))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use intake_core::config::ParentStyle;
    use intake_core::{PropertyDescriptor, PropertyValue, RecordDraft};
    use serde_json::json;

    use super::{create_page_body, property_value, DatabaseResponse, RICH_TEXT_CHUNK_CHARS};

    #[test]
    fn database_response_decodes_select_choices_in_order() {
        let response: DatabaseResponse = serde_json::from_value(json!({
            "object": "database",
            "id": "db-1",
            "properties": {
                "Title": { "id": "title", "name": "Title", "type": "title", "title": {} },
                "Type": {
                    "id": "a1",
                    "type": "select",
                    "select": { "options": [
                        { "id": "1", "name": "Bug", "color": "red" },
                        { "id": "2", "name": "Feature", "color": "blue" },
                        { "id": "3", "name": "Change", "color": "gray" }
                    ] }
                },
                "Owner": { "id": "p", "type": "people", "people": {} }
            }
        }))
        .expect("decode database");

        let schema = response.into_schema();

        assert_eq!(schema.collection_id, "db-1");
        assert_eq!(
            schema.property("Type"),
            Some(&PropertyDescriptor::Select {
                options: vec!["Bug".to_owned(), "Feature".to_owned(), "Change".to_owned()]
            })
        );
        assert_eq!(schema.property("Title"), Some(&PropertyDescriptor::Title));
        assert_eq!(
            schema.property("Owner"),
            Some(&PropertyDescriptor::Other { kind: "people".to_owned() })
        );
    }

    #[test]
    fn select_without_option_block_decodes_as_empty_choices() {
        let response: DatabaseResponse = serde_json::from_value(json!({
            "id": "db-2",
            "properties": { "Team": { "type": "select" } }
        }))
        .expect("decode database");

        assert_eq!(
            response.into_schema().property("Team"),
            Some(&PropertyDescriptor::Select { options: Vec::new() })
        );
    }

    #[test]
    fn create_body_uses_configured_parent_style() {
        let mut draft = RecordDraft::new();
        draft.set("Title", PropertyValue::Title("Login broken".to_owned()));
        draft.set("Start Date", PropertyValue::Date(NaiveDate::from_ymd_opt(2026, 1, 2).expect("date")));

        let flat = create_page_body(ParentStyle::DatabaseId, "db-1", &draft);
        assert_eq!(flat["parent"], json!({ "database_id": "db-1" }));
        assert_eq!(flat["properties"]["Title"]["title"][0]["text"]["content"], "Login broken");
        assert_eq!(flat["properties"]["Start Date"]["date"]["start"], "2026-01-02");

        let typed = create_page_body(ParentStyle::Typed, "db-1", &draft);
        assert_eq!(typed["parent"], json!({ "type": "database_id", "database_id": "db-1" }));
    }

    #[test]
    fn empty_select_is_sent_as_null_and_long_text_is_chunked() {
        assert_eq!(property_value(&PropertyValue::Select(String::new())), json!({ "select": null }));

        let long = "x".repeat(RICH_TEXT_CHUNK_CHARS + 5);
        let value = property_value(&PropertyValue::RichText(long));
        let items = value["rich_text"].as_array().expect("rich text array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["text"]["content"], "xxxxx");
    }
}
