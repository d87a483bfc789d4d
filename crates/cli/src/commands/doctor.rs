use intake_core::config::{AppConfig, LoadOptions};
use intake_core::form::select_options;
use intake_core::{CollectionSchema, FieldKind, FormDefinition, RecordStore};
use intake_store::NotionClient;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(DoctorCheck {
                name: "slack_token_readiness",
                status: CheckStatus::Pass,
                details: "xapp-/xoxb- token formats validated by config contract".to_string(),
            });

            match fetch_schema(&config) {
                Ok(schema) => {
                    checks.push(DoctorCheck {
                        name: "record_store_connectivity",
                        status: CheckStatus::Pass,
                        details: format!(
                            "fetched schema for `{}` ({} properties)",
                            config.notion.database_id,
                            schema.len()
                        ),
                    });
                    checks.push(check_form_options(&config, &schema));
                }
                Err(error) => {
                    checks.push(DoctorCheck {
                        name: "record_store_connectivity",
                        status: CheckStatus::Fail,
                        details: error,
                    });
                    checks.push(skipped("form_select_options", "record store is unreachable"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_token_readiness", "record_store_connectivity", "form_select_options"]
            {
                checks.push(skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
}

pub(crate) fn fetch_schema(config: &AppConfig) -> Result<CollectionSchema, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))?;

    let client = NotionClient::new(&config.notion).map_err(|error| error.to_string())?;
    runtime.block_on(client.fetch_schema()).map_err(|error| {
        if error.is_unauthorized() {
            format!("notion rejected the api key: {}", error.reason())
        } else {
            error.to_string()
        }
    })
}

/// Select fields whose property is missing or unusable still render, using
/// their defaults, so they are reported but do not fail the check.
fn check_form_options(config: &AppConfig, schema: &CollectionSchema) -> DoctorCheck {
    let definition = FormDefinition::ticket_request(&config.form.callback_id, &config.form.title);
    let details = definition
        .fields
        .iter()
        .filter_map(|field| match &field.kind {
            FieldKind::SingleSelect { property, defaults } => {
                Some(match select_options(schema, property) {
                    Ok(options) => format!("{}: schema ({} options)", field.id, options.len()),
                    Err(error) => {
                        format!("{}: fallback ({} defaults; {error})", field.id, defaults.len())
                    }
                })
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("; ");

    DoctorCheck { name: "form_select_options", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
