//! Parameter input for structured runs.

use std::path::Path;

use anyhow::{Context, bail};
use modeller_bridge::Parameter;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ParameterEntry {
    name: String,
    value: String,
}

/// Parse a `name=value` argument. The value may itself contain `=`.
fn parse_pair(arg: &str) -> anyhow::Result<Parameter> {
    let Some((name, value)) = arg.split_once('=') else {
        bail!("Invalid parameter '{}': expected NAME=VALUE", arg);
    };
    if name.is_empty() {
        bail!("Invalid parameter '{}': name is empty", arg);
    }
    Ok(Parameter::new(name, value))
}

/// Parse a JSON array of `{"name": .., "value": ..}` objects.
fn parse_json(text: &str) -> anyhow::Result<Vec<Parameter>> {
    let entries: Vec<ParameterEntry> = serde_json::from_str(text)?;
    Ok(entries
        .into_iter()
        .map(|e| Parameter::new(e.name, e.value))
        .collect())
}

/// File parameters come first, then `--param` arguments in order.
pub fn collect(pairs: &[String], file: Option<&Path>) -> anyhow::Result<Vec<Parameter>> {
    let mut parameters = Vec::new();

    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parameters = parse_json(&text)
            .with_context(|| format!("Failed to parse parameters in {}", path.display()))?;
    }

    for pair in pairs {
        parameters.push(parse_pair(pair)?);
    }

    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair_splits_on_first_equals() {
        let p = parse_pair("filter=i=1,2").unwrap();
        assert_eq!(p.name, "filter");
        assert_eq!(p.value, "i=1,2");

        let p = parse_pair("empty=").unwrap();
        assert_eq!(p.value, "");

        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=1").is_err());
    }

    #[test]
    fn test_parse_json_keeps_order() {
        let params = parse_json(
            r#"[{"name": "scenario", "value": "1"}, {"name": "mode", "value": "auto"}]"#,
        )
        .unwrap();
        assert_eq!(
            params,
            vec![Parameter::new("scenario", "1"), Parameter::new("mode", "auto")]
        );

        assert!(parse_json(r#"[{"name": "scenario"}]"#).is_err());
        assert!(parse_json(r#"{"name": "a", "value": "b"}"#).is_err());
    }

    #[test]
    fn test_collect_appends_pairs_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"[{"name": "a", "value": "1"}]"#).unwrap();

        let params = collect(&["b=2".to_string()], Some(&path)).unwrap();
        assert_eq!(params, vec![Parameter::new("a", "1"), Parameter::new("b", "2")]);

        assert!(collect(&[], Some(&dir.path().join("missing.json"))).is_err());
    }
}
