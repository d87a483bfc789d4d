use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::{CollectionSchema, PropertyDescriptor};
use crate::store::RecordStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

impl FieldOption {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self { label: value.clone(), value }
    }
}

pub fn options<I, S>(values: I) -> Vec<FieldOption>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(FieldOption::new).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    SingleLineText,
    MultiLineText,
    /// Select whose options come from `property` in the collection schema,
    /// or from `defaults` when the schema cannot supply them.
    SingleSelect { property: String, defaults: Vec<FieldOption> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
}

impl FormField {
    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into(), kind: FieldKind::SingleLineText }
    }

    pub fn multiline(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into(), kind: FieldKind::MultiLineText }
    }

    pub fn select(
        id: impl Into<String>,
        label: impl Into<String>,
        property: impl Into<String>,
        defaults: Vec<FieldOption>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: FieldKind::SingleSelect { property: property.into(), defaults },
        }
    }

    pub fn block_id(&self) -> String {
        format!("{}_block", self.id)
    }

    pub fn action_id(&self) -> String {
        match self.kind {
            FieldKind::SingleSelect { .. } => format!("{}_select", self.id),
            FieldKind::SingleLineText | FieldKind::MultiLineText => format!("{}_input", self.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormDefinition {
    pub callback_id: String,
    pub title: String,
    pub submit_label: String,
    pub close_label: String,
    /// Field whose value names the request kind in the confirmation message.
    pub category_field: String,
    pub fields: Vec<FormField>,
}

impl FormDefinition {
    /// The internal request form: type, title, priority, team, description.
    pub fn ticket_request(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: title.into(),
            submit_label: "Submit".to_owned(),
            close_label: "Cancel".to_owned(),
            category_field: "type".to_owned(),
            fields: vec![
                FormField::select("type", "Request Type", "Type", options(["Bug", "Feature", "Change"])),
                FormField::text("title", "Title"),
                FormField::select(
                    "priority",
                    "Priority",
                    "Priority",
                    options(["High", "Medium", "Low"]),
                ),
                FormField::select(
                    "team",
                    "Team",
                    "Team",
                    options([
                        "Account Management",
                        "Human Resources",
                        "Product Design",
                        "Business Development",
                    ]),
                ),
                FormField::multiline("description", "Description"),
            ],
        }
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.id == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    Schema,
    Fallback,
    FreeText,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedField {
    pub field: FormField,
    pub options: Vec<FieldOption>,
    pub source: OptionSource,
}

/// A form with every select's option list decided for one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedForm {
    pub definition: FormDefinition,
    pub fields: Vec<ResolvedField>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OptionLookupError {
    #[error("property `{0}` is not in the collection schema")]
    MissingProperty(String),
    #[error("property `{property}` is `{kind}`, not a select")]
    NotSelect { property: String, kind: String },
    #[error("select property `{0}` declares no choices")]
    NoChoices(String),
}

/// Select choices for `property`, in schema order.
pub fn select_options(
    schema: &CollectionSchema,
    property: &str,
) -> Result<Vec<FieldOption>, OptionLookupError> {
    let descriptor = schema
        .property(property)
        .ok_or_else(|| OptionLookupError::MissingProperty(property.to_owned()))?;

    let PropertyDescriptor::Select { options: choices } = descriptor else {
        return Err(OptionLookupError::NotSelect {
            property: property.to_owned(),
            kind: descriptor.kind().to_owned(),
        });
    };

    if choices.is_empty() {
        return Err(OptionLookupError::NoChoices(property.to_owned()));
    }

    Ok(options(choices.iter().cloned()))
}

pub struct FormBuilder {
    store: Arc<dyn RecordStore>,
}

impl FormBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Live options for `field_name`; empty whenever the schema cannot supply
    /// them, leaving the caller to substitute its defaults.
    pub async fn build_options(&self, field_name: &str) -> Vec<FieldOption> {
        let schema = match self.store.fetch_schema().await {
            Ok(schema) => schema,
            Err(error) => {
                warn!(
                    event_name = "form.options.schema_unavailable",
                    property = field_name,
                    error = %error,
                    "could not fetch collection schema"
                );
                return Vec::new();
            }
        };

        select_options(&schema, field_name).unwrap_or_else(|error| {
            warn!(
                event_name = "form.options.unusable_property",
                property = field_name,
                error = %error,
                "schema cannot supply select options"
            );
            Vec::new()
        })
    }

    pub async fn build_form(&self, definition: &FormDefinition) -> ResolvedForm {
        let has_selects = definition
            .fields
            .iter()
            .any(|field| matches!(field.kind, FieldKind::SingleSelect { .. }));

        let schema = if has_selects {
            match self.store.fetch_schema().await {
                Ok(schema) => Some(schema),
                Err(error) => {
                    warn!(
                        event_name = "form.options.schema_unavailable",
                        callback_id = %definition.callback_id,
                        error = %error,
                        "could not fetch collection schema; using default options"
                    );
                    None
                }
            }
        } else {
            None
        };

        let fields = definition
            .fields
            .iter()
            .map(|field| resolve_field(field, schema.as_ref()))
            .collect();

        ResolvedForm { definition: definition.clone(), fields }
    }
}

fn resolve_field(field: &FormField, schema: Option<&CollectionSchema>) -> ResolvedField {
    let FieldKind::SingleSelect { property, defaults } = &field.kind else {
        return ResolvedField { field: field.clone(), options: Vec::new(), source: OptionSource::FreeText };
    };

    let live = match schema.map(|schema| select_options(schema, property)) {
        Some(Ok(options)) => Some(options),
        Some(Err(error)) => {
            warn!(
                event_name = "form.options.unusable_property",
                field_id = %field.id,
                property = %property,
                error = %error,
                "schema cannot supply select options; using defaults"
            );
            None
        }
        None => None,
    };

    match live {
        Some(options) => {
            debug!(field_id = %field.id, count = options.len(), "using schema select options");
            ResolvedField { field: field.clone(), options, source: OptionSource::Schema }
        }
        None => ResolvedField {
            field: field.clone(),
            options: defaults.clone(),
            source: OptionSource::Fallback,
        },
    }
}
