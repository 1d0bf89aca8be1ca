// `pgrid ai doctor`: report what a column job would run with

use std::path::Path;

use promptgrid_config::ai::{env_var_name, keychain_available};
use promptgrid_config::settings::Settings;
use promptgrid_config::ResolvedAIConfig;
use serde_json::{json, Value};

use crate::{load_settings, CliError};

/// Always exits 0; the status field says whether jobs can run.
pub fn cmd_ai_doctor(as_json: bool, settings_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(settings_path)?.validated();
    let config = ResolvedAIConfig::from_settings(&settings);
    let source = match settings_path {
        Some(path) => path.display().to_string(),
        None => Settings::config_path_display(),
    };

    let report = doctor_report(&settings, &config, &source);
    if as_json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("failed to encode report: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!("AI Doctor");
    println!("---------");
    println!("status:          {}", config.status.as_str());
    if let Some(reason) = &config.blocking_reason {
        println!("blocking_reason: {}", reason);
    }
    println!("provider:        {}", config.provider_name());
    println!("model:           {}", config.model);
    println!("temperature:     {}", config.temperature);
    println!("max_tokens:      {}", config.max_tokens);
    println!("delay_ms:        {}", settings.processing_delay_ms);
    println!("rate_limit:      {}/min", settings.rate_limit_per_minute);
    println!("key:             {}", if config.api_key.is_some() { "present" } else { "missing" });
    println!("key_source:      {}", config.key_source.as_str());
    println!("keychain:        {}", if keychain_available() { "ok" } else { "unavailable" });
    println!("settings:        {}", source);

    if !config.status.is_ready() {
        println!();
        println!("Fix: export {}=<key>", env_var_name(config.provider_name()));
    }
    Ok(())
}

fn doctor_report(settings: &Settings, config: &ResolvedAIConfig, source: &str) -> Value {
    json!({
        "schema_version": 1,
        "status": config.status.as_str(),
        "blocking_reason": config.blocking_reason,
        "provider": config.provider_name(),
        "model_configured": !settings.ai_model.trim().is_empty(),
        "model_effective": config.model,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "response_format": settings.response_format,
        "status_channel": settings.status_channel,
        "processing_delay_ms": settings.processing_delay_ms,
        "rate_limit_per_minute": settings.rate_limit_per_minute,
        "key": if config.api_key.is_some() { "present" } else { "missing" },
        "key_source": config.key_source.as_str(),
        "key_env_var": env_var_name(config.provider_name()),
        "keychain": if keychain_available() { "ok" } else { "unavailable" },
        "settings_path": source,
    })
}
