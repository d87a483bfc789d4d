use intake_core::config::{AppConfig, LoadOptions};
use intake_core::form::select_options;
use intake_core::{CollectionSchema, FieldKind, FieldOption, FormDefinition, PropertyDescriptor};

use crate::commands::doctor::fetch_schema;
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "schema",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    match fetch_schema(&config) {
        Ok(schema) => {
            let definition =
                FormDefinition::ticket_request(&config.form.callback_id, &config.form.title);
            CommandResult::success("schema", describe(&schema, &definition))
        }
        Err(error) => CommandResult::failure("schema", "record_store", error, 4),
    }
}

fn describe(schema: &CollectionSchema, definition: &FormDefinition) -> String {
    let mut lines = vec![format!("collection {} ({} properties):", schema.collection_id, schema.len())];
    for name in schema.property_names() {
        let Some(descriptor) = schema.property(name) else {
            continue;
        };
        let choices = match descriptor {
            PropertyDescriptor::Select { options }
            | PropertyDescriptor::MultiSelect { options }
            | PropertyDescriptor::Status { options } => format!(": {}", options.join(", ")),
            _ => String::new(),
        };
        lines.push(format!("  - {name} ({}){choices}", descriptor.kind()));
    }

    lines.push("form select fields:".to_string());
    for field in &definition.fields {
        let FieldKind::SingleSelect { property, defaults } = &field.kind else {
            continue;
        };
        let (source, values) = match select_options(schema, property) {
            Ok(options) => ("schema", join_values(&options)),
            Err(_) => ("fallback", join_values(defaults)),
        };
        lines.push(format!("  - {} <- {property}: {source} [{values}]", field.id));
    }
    lines.join("\n")
}

fn join_values(options: &[FieldOption]) -> String {
    options.iter().map(|option| option.value.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use intake_core::{CollectionSchema, FormDefinition, PropertyDescriptor};

    use super::describe;

    #[test]
    fn describe_lists_properties_sorted_with_choices() {
        let schema = CollectionSchema::new("db-1")
            .with_property("Title", PropertyDescriptor::Title)
            .with_property(
                "Priority",
                PropertyDescriptor::Select {
                    options: vec!["High".to_string(), "Low".to_string()],
                },
            );

        let definition = FormDefinition::ticket_request("ticket_form", "Create Ticket");

        let described = describe(&schema, &definition);

        assert!(described.starts_with(
            "collection db-1 (2 properties):\n  - Priority (select): High, Low\n  - Title (title)"
        ));
        assert!(described.contains("  - priority <- Priority: schema [High, Low]"));
        assert!(described.contains("  - type <- Type: fallback [Bug, Feature, Change]"));
    }
}
