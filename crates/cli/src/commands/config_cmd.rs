//! `johnathan config` — Configuration management commands.

use johnathan_config::AppConfig;

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_redacted_toml());
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            if config.has_api_key() {
                println!("   API key:   set");
            } else {
                println!("   Warning: no API key (set JOHNATHAN_API_KEY or ANTHROPIC_API_KEY)");
            }
            println!("   Model:     {}", config.model);
            println!("   Endpoint:  {}", config.base_url);
            println!("   Streaming: {}", config.stream);
            Ok(())
        }
        Err(e) => {
            println!("   Config error: {e}");
            Err(e.into())
        }
    }
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
