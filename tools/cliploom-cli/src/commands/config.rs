//! Show or write the effective configuration.

use cliploom_common::config::AppConfig;

pub fn run(config: &AppConfig, write: bool) -> anyhow::Result<()> {
    let path = AppConfig::path();
    println!("Config file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        config
            .save()
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
