use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::submission::{SubmissionValues, SubmittingUser};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Select(String),
    Date(NaiveDate),
}

/// Property set for a single create-record call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    properties: BTreeMap<String, PropertyValue>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: impl Into<String>, value: PropertyValue) {
        self.properties.insert(property.into(), value);
    }

    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Title,
    RichText,
    Select,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBinding {
    pub field: String,
    pub property: String,
    pub kind: BindingKind,
}

impl PropertyBinding {
    pub fn new(field: impl Into<String>, property: impl Into<String>, kind: BindingKind) -> Self {
        Self { field: field.into(), property: property.into(), kind }
    }
}

/// Field-to-property correspondence plus the properties stamped on every
/// record regardless of what the user entered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMapping {
    pub bindings: Vec<PropertyBinding>,
    pub status_property: String,
    pub initial_status: String,
    pub created_date_property: String,
    pub created_by_property: Option<String>,
}

impl Default for RecordMapping {
    fn default() -> Self {
        Self {
            bindings: vec![
                PropertyBinding::new("title", "Title", BindingKind::Title),
                PropertyBinding::new("type", "Type", BindingKind::Select),
                PropertyBinding::new("priority", "Priority", BindingKind::Select),
                PropertyBinding::new("team", "Team", BindingKind::Select),
                PropertyBinding::new("description", "Description", BindingKind::RichText),
            ],
            status_property: "Status".to_owned(),
            initial_status: "Not started".to_owned(),
            created_date_property: "Start Date".to_owned(),
            created_by_property: None,
        }
    }
}

impl RecordMapping {
    pub fn draft(
        &self,
        values: &SubmissionValues,
        user: &SubmittingUser,
        today: NaiveDate,
    ) -> RecordDraft {
        let mut draft = RecordDraft::new();

        for binding in &self.bindings {
            let value = values.get(&binding.field).to_owned();
            let value = match binding.kind {
                BindingKind::Title => PropertyValue::Title(value),
                BindingKind::RichText => PropertyValue::RichText(value),
                BindingKind::Select => PropertyValue::Select(value),
            };
            draft.set(binding.property.clone(), value);
        }

        draft.set(self.status_property.clone(), PropertyValue::Select(self.initial_status.clone()));
        draft.set(self.created_date_property.clone(), PropertyValue::Date(today));
        if let Some(property) = &self.created_by_property {
            draft.set(property.clone(), PropertyValue::RichText(user.display_name.clone()));
        }

        draft
    }

    /// Form field whose value becomes the record title.
    pub fn title_field(&self) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| binding.kind == BindingKind::Title)
            .map(|binding| binding.field.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bindings.is_empty() {
            return Err("record.bindings must declare at least one field binding".to_owned());
        }

        let titles = self.bindings.iter().filter(|binding| binding.kind == BindingKind::Title);
        if titles.count() != 1 {
            return Err("record.bindings must contain exactly one `title` binding".to_owned());
        }

        if let Some(binding) = self
            .bindings
            .iter()
            .find(|binding| binding.field.trim().is_empty() || binding.property.trim().is_empty())
        {
            return Err(format!(
                "record.bindings entries need a field and a property (got field=`{}` property=`{}`)",
                binding.field, binding.property
            ));
        }

        let mut seen = std::collections::HashSet::new();
        let stamped = [Some(&self.status_property), Some(&self.created_date_property)]
            .into_iter()
            .chain(std::iter::once(self.created_by_property.as_ref()))
            .flatten();
        for property in self.bindings.iter().map(|binding| &binding.property).chain(stamped) {
            if property.trim().is_empty() {
                return Err("record property names must not be empty".to_owned());
            }
            if !seen.insert(property.as_str()) {
                return Err(format!("record property `{property}` is mapped more than once"));
            }
        }

        if self.initial_status.trim().is_empty() {
            return Err("record.initial_status must not be empty".to_owned());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{BindingKind, PropertyBinding, PropertyValue, RecordMapping};
    use crate::submission::{SubmissionValues, SubmittingUser};

    fn user() -> SubmittingUser {
        SubmittingUser { id: "U123".to_owned(), display_name: "dana".to_owned() }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date")
    }

    #[test]
    fn default_mapping_produces_bug_report_record() {
        let values = SubmissionValues::new()
            .with("type", "Bug")
            .with("title", "Login broken")
            .with("priority", "High")
            .with("team", "Product Design")
            .with("description", "Cannot log in with SSO");

        let draft = RecordMapping::default().draft(&values, &user(), day());

        assert_eq!(draft.get("Type"), Some(&PropertyValue::Select("Bug".to_owned())));
        assert_eq!(draft.get("Title"), Some(&PropertyValue::Title("Login broken".to_owned())));
        assert_eq!(
            draft.get("Description"),
            Some(&PropertyValue::RichText("Cannot log in with SSO".to_owned()))
        );
        assert_eq!(draft.get("Status"), Some(&PropertyValue::Select("Not started".to_owned())));
        assert_eq!(draft.get("Start Date"), Some(&PropertyValue::Date(day())));
        assert_eq!(draft.len(), 7);
    }

    #[test]
    fn empty_optional_fields_pass_through_as_empty_values() {
        let values = SubmissionValues::new().with("type", "Feature").with("title", "Dark mode");

        let draft = RecordMapping::default().draft(&values, &user(), day());

        assert_eq!(draft.get("Description"), Some(&PropertyValue::RichText(String::new())));
        assert_eq!(draft.get("Team"), Some(&PropertyValue::Select(String::new())));
    }

    #[test]
    fn created_by_is_stamped_when_configured() {
        let mapping = RecordMapping {
            created_by_property: Some("Created By".to_owned()),
            ..RecordMapping::default()
        };

        let draft = mapping.draft(&SubmissionValues::new(), &user(), day());

        assert_eq!(draft.get("Created By"), Some(&PropertyValue::RichText("dana".to_owned())));
    }

    #[test]
    fn injected_table_renames_properties() {
        let mapping = RecordMapping {
            bindings: vec![
                PropertyBinding::new("title", "Name", BindingKind::Title),
                PropertyBinding::new("type", "Request Type", BindingKind::Select),
            ],
            ..RecordMapping::default()
        };

        let values = SubmissionValues::new().with("title", "Onboard vendor").with("type", "Change");
        let draft = mapping.draft(&values, &user(), day());

        assert_eq!(draft.get("Name"), Some(&PropertyValue::Title("Onboard vendor".to_owned())));
        assert!(draft.get("Title").is_none());
        assert_eq!(mapping.title_field(), Some("title"));
    }

    #[test]
    fn validation_rejects_duplicate_and_missing_title_bindings() {
        let no_title = RecordMapping {
            bindings: vec![PropertyBinding::new("type", "Type", BindingKind::Select)],
            ..RecordMapping::default()
        };
        assert!(no_title.validate().is_err());

        let duplicate = RecordMapping {
            bindings: vec![
                PropertyBinding::new("title", "Title", BindingKind::Title),
                PropertyBinding::new("type", "Status", BindingKind::Select),
            ],
            ..RecordMapping::default()
        };
        let error = duplicate.validate().expect_err("status mapped twice");
        assert!(error.contains("Status"));

        assert!(RecordMapping::default().validate().is_ok());
    }
}
