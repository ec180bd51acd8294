//! Config commands - Inspect and edit per-scope configuration

use anyhow::{bail, Context};

use dmas_control::ControlCenter;
use dmas_types::ConfigScope;

use crate::display;

/// Fetch and print the configuration of one scope
pub async fn show(center: &ControlCenter, scope: ConfigScope) -> anyhow::Result<()> {
    center
        .refresh_config(scope)
        .await
        .with_context(|| format!("failed to fetch {} configuration", scope))?;

    display::section(&format!("Configuration: {}", scope));
    let entry = center.config(scope);
    if entry.is_empty() {
        display::info("No keys set");
    }
    for (key, value) in entry.iter() {
        display::kv(key, value);
    }
    Ok(())
}

/// Split `KEY=VALUE` arguments
pub fn parse_assignments(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => bail!("expected KEY=VALUE, got {:?}", pair),
        })
        .collect()
}

/// Edit keys of one scope, optionally pushing the result to the backend
pub async fn set(
    center: &ControlCenter,
    scope: ConfigScope,
    pairs: &[String],
    save: bool,
) -> anyhow::Result<()> {
    let assignments = parse_assignments(pairs)?;

    // Start from the backend's entry so a save pushes every key
    center
        .refresh_config(scope)
        .await
        .with_context(|| format!("failed to fetch {} configuration", scope))?;

    display::section(&format!("Configuration: {}", scope));
    for (key, value) in assignments {
        match center.set_config_value(scope, key.clone(), value.clone()) {
            Some(old) if old == value => display::info(&format!("{} unchanged ({})", key, value)),
            Some(old) => display::success(&format!("{}: {} → {}", key, old, value)),
            None => display::success(&format!("{}: {} (new)", key, value)),
        }
    }

    if !save {
        display::warning("Edits are local only; pass --save to push them");
        return Ok(());
    }

    let ack = center
        .save_config(scope)
        .await
        .with_context(|| format!("failed to save {} configuration", scope))?;
    display::labeled("Backend", &ack.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(&["host=10.0.0.1".to_string(), "url=a=b".to_string()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("host".to_string(), "10.0.0.1".to_string()),
                ("url".to_string(), "a=b".to_string()),
            ]
        );
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=x".to_string()]).is_err());
    }
}
