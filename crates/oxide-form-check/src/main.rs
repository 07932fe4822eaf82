//! oxide-form-check CLI
//!
//! Validates submitted values against a declarative form schema.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_form_state::{
    flatten, FieldValues, FormCallbacks, FormSchema, FormStore, NestedValue, ValidateErrorInfo,
};

/// Check form values against a JSON form schema.
#[derive(Parser)]
#[command(name = "oxide-form-check")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Form schema file (JSON).
    #[arg(short, long, env = "FORM_SCHEMA")]
    schema: PathBuf,

    /// Submitted values file (nested JSON object).
    #[arg(long)]
    values: Option<PathBuf>,

    /// Print the outcome as JSON.
    #[arg(long)]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

type Outcome = Result<FieldValues, ValidateErrorInfo>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let schema = load_schema(&cli.schema)?;
    let store = schema
        .build()
        .with_context(|| format!("invalid form schema {}", cli.schema.display()))?;
    info!("Loaded {} field(s) from {}", schema.fields.len(), cli.schema.display());

    if let Some(path) = &cli.values {
        let values = load_values(path)?;
        debug!("Applying {} value(s)", values.len());
        store.set_fields_value(values);
    }

    match submit(&store).await? {
        Ok(values) => {
            if cli.json {
                let output = serde_json::json!({ "values": values });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", render_values(&values));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error_info) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&error_info)?);
            } else {
                print!("{}", error_info.describe());
            }
            info!("{}", error_info);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_schema(path: &Path) -> anyhow::Result<FormSchema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    FormSchema::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_values(path: &Path) -> anyhow::Result<FieldValues> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read values {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    parse_values(json)
}

/// Flattens a nested values object into flat keys.
fn parse_values(json: serde_json::Value) -> anyhow::Result<FieldValues> {
    let tree = NestedValue::from(json);
    if !matches!(tree, NestedValue::Object(_)) {
        bail!("values must be a JSON object");
    }
    Ok(flatten(&tree))
}

/// Runs the submit lifecycle and captures whichever callback fires.
async fn submit(store: &FormStore) -> anyhow::Result<Outcome> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
    let failed_tx = tx.clone();
    store.set_callbacks(
        FormCallbacks::new()
            .on_finish(move |values| {
                if tx.send(Ok(values.clone())).is_err() {
                    warn!("submit outcome dropped: receiver closed");
                }
            })
            .on_finish_failed(move |error_info| {
                if failed_tx.send(Err(error_info.clone())).is_err() {
                    warn!("submit outcome dropped: receiver closed");
                }
            }),
    );

    store.submit().await;
    rx.recv().await.context("submit reported no outcome")
}

fn render_values(values: &FieldValues) -> String {
    values
        .iter()
        .map(|(key, value)| format!("{key} = {}\n", value.to_text()))
        .collect()
}

#[cfg(test)]
mod tests {
    use oxide_form_state::FieldValue;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_values_flattens() {
        let values = parse_values(json!({
            "user": { "age": 21, "tags": ["a", "b"] },
            "items": [{ "name": "x" }],
        }))
        .unwrap();

        assert_eq!(values.get("user.age"), Some(&FieldValue::from(21)));
        assert_eq!(values.get("user.tags"), Some(&FieldValue::from(vec!["a", "b"])));
        assert_eq!(values.get("items.0.name"), Some(&FieldValue::from("x")));
    }

    #[test]
    fn test_parse_values_rejects_non_object() {
        assert!(parse_values(json!([1, 2])).is_err());
        assert!(parse_values(json!("x")).is_err());
    }

    #[test]
    fn test_render_values() {
        let values = parse_values(json!({ "a": 1.5, "b": { "c": true }, "d": null })).unwrap();
        assert_eq!(render_values(&values), "a = 1.5\nb.c = true\nd = \n");
    }

    #[tokio::test]
    async fn test_signup_demo() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let store = load_schema(&demos.join("signup.json")).unwrap().build().unwrap();

        let failed = submit(&store).await.unwrap().unwrap_err();
        let fields: Vec<String> = failed.all_errors().into_iter().map(|(field, _)| field).collect();
        assert_eq!(fields, vec!["email", "user.age", "user.name"]);
        assert_eq!(failed.get("user.age"), Some(&["user.age must be at least 18".to_string()][..]));

        store.set_fields_value(load_values(&demos.join("signup-values.json")).unwrap());
        assert!(submit(&store).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_submit_outcomes() {
        let schema: FormSchema = serde_json::from_value(json!({
            "fields": [{ "name": "email", "rules": [{ "required": true }, { "type": "email" }] }]
        }))
        .unwrap();
        let store = schema.build().unwrap();

        let failed = submit(&store).await.unwrap().unwrap_err();
        assert_eq!(failed.describe(), "email: This field is required.\n");

        store.set_field_value("email", "ada@example.com");
        let values = submit(&store).await.unwrap().unwrap();
        assert_eq!(values.get("email"), Some(&FieldValue::from("ada@example.com")));
    }
}
