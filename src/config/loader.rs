use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix of environment variables that override file settings,
/// e.g. `GATEWAY__RATE_LIMIT__REQUESTS=50`.
pub const ENV_PREFIX: &str = "GATEWAY";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from an optional file overlaid with environment variables
/// Supports multiple formats: YAML, JSON, TOML, INI
pub async fn load_config(config_path: Option<&str>) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: Option<&str>) -> Result<GatewayConfig> {
    load_config_from(config_path, Environment::with_prefix(ENV_PREFIX))
}

fn load_config_from(config_path: Option<&str>, environment: Environment) -> Result<GatewayConfig> {
    // Seed each default service as its own key so a source overriding one
    // service URL does not drop the others.
    let mut builder = Config::builder();
    for (name, url) in GatewayConfig::default().services {
        builder = builder
            .set_default(format!("services.{name}"), url)
            .wrap_err_with(|| format!("Failed to seed default for service '{name}'"))?;
    }

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(
            File::new(config_path, file_format(path))
                .required(false),
        );
    }

    let settings = builder
        .add_source(environment.separator(ENV_SEPARATOR).try_parsing(true))
        .build()
        .with_context(|| match config_path {
            Some(path) => format!("Failed to build config from {path}"),
            None => "Failed to build config from environment".to_string(),
        })?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize gateway configuration")?;

    Ok(gateway_config)
}

/// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}
