use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pipeline::PipelineConfig;

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # Webplyzer Configuration
///
/// # Server configuration
/// listen_on_port = 5000
/// permits = 4
/// workspace = "./data"
///
/// # Upload limits
/// max_files = 25
/// max_upload_mb = 100
/// allowed_extensions = ["jpg", "jpeg", "png"]
///
/// # Encoder
/// quality = 90
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Number of concurrent conversion requests
    #[arg(short, long, default_value_t = default_permits())]
    #[serde(default = "default_permits")]
    pub permits: usize,

    /// Working directory for per-request scratch files
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Configuration file path (overrides all other arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Maximum number of files accepted in one request
    #[arg(long, default_value_t = 25)]
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum total request body size in MiB
    #[arg(long, default_value_t = 100)]
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Accepted source file extensions (case-insensitive)
    #[arg(long = "allowed-extension", value_delimiter = ',', default_values_t = default_allowed_extensions())]
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// WebP encode quality (0-100)
    #[arg(short, long, default_value_t = 90)]
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            permits: default_permits(),
            workspace: default_workspace(),
            config: None,
            max_files: default_max_files(),
            max_upload_mb: default_max_upload_mb(),
            allowed_extensions: default_allowed_extensions(),
            quality: default_quality(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.permits == default_permits() {
            self.permits = file_config.permits;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.max_files == default_max_files() {
            self.max_files = file_config.max_files;
        }
        if self.max_upload_mb == default_max_upload_mb() {
            self.max_upload_mb = file_config.max_upload_mb;
        }
        if self.allowed_extensions == default_allowed_extensions() {
            self.allowed_extensions = file_config.allowed_extensions;
        }
        if self.quality == default_quality() {
            self.quality = file_config.quality;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.permits == 0 {
            return Err(anyhow::anyhow!("permits must be at least 1"));
        }
        if self.max_files == 0 {
            return Err(anyhow::anyhow!("max_files must be at least 1"));
        }
        if self.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("max_upload_mb must be at least 1"));
        }
        if self.quality > 100 {
            return Err(anyhow::anyhow!(
                "quality can only be set in the range 0-100, got {}",
                self.quality
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("at least one allowed extension is required"));
        }
        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.contains('.'))
        {
            return Err(anyhow::anyhow!(
                "Invalid extension {ext:?}: use bare extensions such as \"png\""
            ));
        }

        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Settings handed to the conversion pipeline
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_files: self.max_files,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            quality: self.quality,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    5000
}

fn default_permits() -> usize {
    num_cpus::get().max(1)
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_max_files() -> usize {
    25
}

fn default_max_upload_mb() -> usize {
    100
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

fn default_quality() -> u8 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_from_cli() {
        let cli_content = [
            "CLI",
            "--listen-on-port",
            "8080",
            "--permits",
            "2",
            "--workspace",
            "/tmp/test",
            "--max-files",
            "10",
            "--allowed-extension",
            "png,webp",
            "--quality",
            "75",
        ];

        let config = Config::try_parse_from(cli_content).unwrap();

        assert_eq!(config.listen_on_port, 8080);
        assert_eq!(config.permits, 2);
        assert_eq!(config.workspace, "/tmp/test");
        assert_eq!(config.max_files, 10);
        assert_eq!(config.max_upload_mb, 100);
        assert_eq!(config.allowed_extensions, vec!["png", "webp"]);
        assert_eq!(config.quality, 75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
            listen_on_port = 8080
            permits = 3
            workspace = "/tmp/test"
            max_files = 5
            max_upload_mb = 20
            allowed_extensions = ["PNG"]
            quality = 80
        "#;

        let config: Config = toml::from_str(toml_content).unwrap();

        assert_eq!(config.listen_on_port, 8080);
        assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.max_files, 5);
        assert_eq!(pipeline.allowed_extensions, vec!["png"]);
        assert_eq!(pipeline.quality, 80);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("listen_on_port = 9000").unwrap();

        assert_eq!(config.listen_on_port, 9000);
        assert_eq!(config.max_files, 25);
        assert_eq!(config.max_upload_mb, 100);
        assert_eq!(config.quality, 90);
        assert_eq!(config.allowed_extensions, vec!["jpg", "jpeg", "png"]);
    }

    #[test]
    fn test_config_merge_with_file() {
        let file_config = Config {
            listen_on_port: 7000,
            max_files: 3,
            quality: 60,
            ..Default::default()
        };

        let cli_config = Config {
            listen_on_port: 9000,
            ..Default::default()
        };

        let merged = cli_config.merge_with_file(file_config);

        assert_eq!(merged.listen_on_port, 9000); // CLI value takes precedence
        assert_eq!(merged.max_files, 3); // File value used when CLI is default
        assert_eq!(merged.quality, 60);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            quality: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_files: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            allowed_extensions: vec![".png".to_string()],
            ..Default::default()
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("Invalid extension"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
    }
}
