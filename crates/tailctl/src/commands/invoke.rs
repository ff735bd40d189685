//! `tailctl invoke <tool> <operation>` handler.

use std::io::Read;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use tailctl_core::Dispatcher;

use crate::cli::{GlobalOpts, InvokeArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &InvokeArgs,
    dispatcher: &Dispatcher,
    global: &GlobalOpts,
    format: OutputFormat,
) -> Result<(), CliError> {
    let params = build_params(args, read_source)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight requests");
            on_interrupt.cancel();
        }
    });

    let result = dispatcher
        .invoke_with(&args.tool, &args.operation, params, cancel)
        .await;
    watcher.abort();

    output::print_output(&output::render(format, &result?)?, global.quiet);
    Ok(())
}

/// Read `--params-json` input: `-` is stdin, `@path` a file, anything else literal.
fn read_source(raw: &str) -> Result<String, CliError> {
    if raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    match raw.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(raw.to_owned()),
    }
}

/// Assemble the params object: `--params-json` first, then `-P` and `-J`
/// pairs on top in command-line order.
fn build_params(
    args: &InvokeArgs,
    read: impl Fn(&str) -> Result<String, CliError>,
) -> Result<Value, CliError> {
    let mut params = match args.params_json {
        None => Map::new(),
        Some(ref raw) => match serde_json::from_str(&read(raw)?)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(CliError::Validation {
                    field: "--params-json".into(),
                    reason: "must be a JSON object".into(),
                });
            }
        },
    };

    for pair in &args.params {
        let (key, value) = split_pair(pair, "--param")?;
        params.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    for pair in &args.json_params {
        let (key, value) = split_pair(pair, "--json")?;
        let parsed = serde_json::from_str(value).map_err(|e| CliError::Validation {
            field: key.to_owned(),
            reason: format!("not valid JSON ({e}); use -P for plain strings"),
        })?;
        params.insert(key.to_owned(), parsed);
    }

    Ok(Value::Object(params))
}

fn split_pair<'a>(pair: &'a str, flag: &str) -> Result<(&'a str, &'a str), CliError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::Validation {
            field: flag.into(),
            reason: format!("expected KEY=VALUE, got '{pair}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn args(params: &[&str], json_params: &[&str], params_json: Option<&str>) -> InvokeArgs {
        InvokeArgs {
            tool: "device".into(),
            operation: "list".into(),
            params: params.iter().map(|s| (*s).to_owned()).collect(),
            json_params: json_params.iter().map(|s| (*s).to_owned()).collect(),
            params_json: params_json.map(str::to_owned),
        }
    }

    fn literal(raw: &str) -> Result<String, CliError> {
        Ok(raw.to_owned())
    }

    #[test]
    fn string_and_json_pairs_are_typed_by_flag() {
        let params = build_params(
            &args(
                &["device_id=n123", "search=a=b"],
                &["limit=10", "online_only=true", r#"tags=["tag:web"]"#],
                None,
            ),
            literal,
        )
        .unwrap();
        assert_eq!(
            params,
            json!({
                "device_id": "n123",
                "search": "a=b",
                "limit": 10,
                "online_only": true,
                "tags": ["tag:web"],
            })
        );
    }

    #[test]
    fn pairs_override_params_json() {
        let params = build_params(
            &args(&["status=offline"], &[], Some(r#"{"status": "online", "limit": 5}"#)),
            literal,
        )
        .unwrap();
        assert_eq!(params, json!({"status": "offline", "limit": 5}));
    }

    #[test]
    fn params_json_reads_through_the_source() {
        let read = |raw: &str| {
            assert_eq!(raw, "@params.json");
            Ok::<_, CliError>(r#"{"policy": {"acls": []}}"#.to_owned())
        };
        let params = build_params(&args(&[], &[], Some("@params.json")), read).unwrap();
        assert_eq!(params, json!({"policy": {"acls": []}}));
    }

    #[test]
    fn malformed_input_is_a_usage_error() {
        for bad in [
            args(&["no-equals"], &[], None),
            args(&["=value"], &[], None),
            args(&[], &["limit=ten"], None),
            args(&[], &[], Some("[1, 2]")),
        ] {
            let err = build_params(&bad, literal).unwrap_err();
            assert!(matches!(err, CliError::Validation { .. }), "{err:?}");
        }
    }
}
