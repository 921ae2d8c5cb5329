use std::path::Path;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, ClipscoutError, Result};
use crate::classifier::classify_with_hint;
use crate::config::Config;
use crate::domain::{Platform, ResolveHints};

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn resolve(ctx: &AppContext, target: &str, hints: &ResolveHints) -> Result<()> {
    match ctx.pipeline.resolve(target, hints).await {
        Ok(record) => print_json(&record),
        Err(failure) => {
            print_json(&failure)?;
            Err(ClipscoutError::Resolution(failure))
        }
    }
}

pub fn classify(target: &str, platform: Option<Platform>) -> Result<()> {
    let target = classify_with_hint(target, platform)
        .map_err(|e| ClipscoutError::Other(e.to_string()))?;

    print_json(&json!({
        "platform": target.platform(),
        "content_type": target.content_type(),
        "canonical_id": target.canonical_id(),
        "canonical_url": target.canonical_url(),
    }))
}

/// Targets listed in `path`, skipping blank lines and `#` comments
pub fn read_targets(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("# "))
        .map(String::from)
        .collect())
}

pub async fn batch(ctx: &AppContext, path: &Path, hints: &ResolveHints) -> Result<()> {
    let targets = read_targets(path)?;

    if targets.is_empty() {
        eprintln!("No targets in {}", path.display());
        return Ok(());
    }

    eprintln!("Resolving {} targets...", targets.len());

    let total = targets.len();
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling remaining targets...");
            interrupt.cancel();
        }
    });
    let results = ctx.pipeline.resolve_all(targets, hints, &cancel).await;

    let mut resolved = 0;
    let entries: Vec<Value> = results
        .into_iter()
        .map(|(input, result)| match result {
            Ok(record) => {
                resolved += 1;
                json!({ "input": input, "result": record })
            }
            Err(failure) => json!({ "input": input, "error": failure }),
        })
        .collect();

    print_json(&json!({
        "results": entries,
        "metrics": ctx.pipeline.metrics().snapshot(),
    }))?;

    eprintln!("Batch complete: {} resolved, {} failed", resolved, total - resolved);
    Ok(())
}

pub fn chains(config: &Config) -> Result<()> {
    let table = config.strategy_table();
    let chains: serde_json::Map<String, Value> = table
        .iter()
        .map(|(platform, ids)| (platform.to_string(), json!(ids)))
        .collect();
    print_json(&chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_targets_skips_blanks_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# my list").unwrap();
        writeln!(file, "https://youtu.be/dQw4w9WgXcQ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  #fyp  ").unwrap();

        let targets = read_targets(file.path()).unwrap();
        assert_eq!(targets, vec!["https://youtu.be/dQw4w9WgXcQ", "#fyp"]);
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(classify("not a url", None).is_err());
        assert!(classify("https://x.com/jack/status/20", None).is_ok());
    }
}
