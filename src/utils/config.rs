//! INI-style configuration: `[section]` headers with `key = value` lines.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, error, warn};

const MAX_SECTIONS: usize = 100;
const MAX_ENTRIES_PER_SECTION: usize = 100;

pub type ConfigSection = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: HashMap<String, ConfigSection>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        if section.is_empty() || key.is_empty() {
            return Err(anyhow::anyhow!("Section or key cannot be empty"));
        }

        if self.sections.len() >= MAX_SECTIONS && !self.sections.contains_key(section) {
            return Err(anyhow::anyhow!(
                "Maximum number of sections ({}) reached",
                MAX_SECTIONS
            ));
        }

        let section_map = self.sections.entry(section.to_string()).or_default();
        if section_map.len() >= MAX_ENTRIES_PER_SECTION && !section_map.contains_key(key) {
            return Err(anyhow::anyhow!(
                "Maximum entries per section ({}) reached for section '{}'",
                MAX_ENTRIES_PER_SECTION,
                section
            ));
        }

        debug!("Setting config: [{}] {} = {}", section, key, value);
        section_map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|section_map| section_map.get(key))
            .map(|v| v.as_str())
    }

    pub fn get_int(&self, section: &str, key: &str, default: i32) -> i32 {
        match self.get_value(section, key) {
            Some(value) => match value.parse::<i32>() {
                Ok(number) => number,
                Err(_) => {
                    warn!(
                        "Invalid integer value '{}' for {}.{}, using default {}",
                        value, section, key, default
                    );
                    default
                }
            },
            None => default,
        }
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "enabled" => true,
                "0" | "false" | "no" | "off" | "disabled" => false,
                other => {
                    warn!(
                        "Invalid boolean value '{}' for {}.{}, using default {}",
                        other, section, key, default
                    );
                    default
                }
            },
            None => default,
        }
    }

    pub fn is_section_exists(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }
}

/// Loads and parses a configuration file.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &str) -> Result<Config> {
        let config_path = Path::new(path.trim());

        if !config_path.exists() {
            return Err(anyhow::anyhow!("Config file does not exist: {}", path));
        }
        if !config_path.is_file() {
            return Err(anyhow::anyhow!("Config path is not a regular file: {}", path));
        }

        let contents = fs::read_to_string(config_path)?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Config {
        let mut config = Config::new();
        let mut current_section = String::new();

        for (index, line) in contents.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current_section = trimmed[1..trimmed.len() - 1].trim().to_string();
                if current_section.is_empty() {
                    warn!("Empty section name at line {}", line_number);
                }
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                warn!(
                    "Invalid config line (no '=' found) at line {}: {}",
                    line_number, trimmed
                );
                continue;
            };

            let key = key.trim();
            if key.is_empty() {
                warn!("Empty key at line {}", line_number);
                continue;
            }

            if current_section.is_empty() {
                warn!(
                    "Key-value pair '{}' outside of section at line {}",
                    key, line_number
                );
                continue;
            }

            let value = unquote(value.trim());
            if let Err(e) = config.set_value(&current_section, key, &value) {
                error!("Failed to set config value at line {}: {}", line_number, e);
            }
        }

        config
    }
}

fn unquote(value: &str) -> String {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_values() {
        let config = ConfigLoader::parse(
            "# dev sink\n[smtp]\naddress = 0.0.0.0\nport = 2500\nmax_workers = 10\n",
        );

        assert_eq!(config.get_value("smtp", "address"), Some("0.0.0.0"));
        assert_eq!(config.get_int("smtp", "port", 25), 2500);
        assert_eq!(config.get_int("smtp", "max_workers", 5), 10);
        assert!(config.is_section_exists("smtp"));
    }

    #[test]
    fn strips_quotes_and_skips_comments() {
        let config = ConfigLoader::parse(
            "[webhook]\n; comment\nurl = \"http://localhost:9000/hook\"\nenabled = yes\n",
        );

        assert_eq!(
            config.get_value("webhook", "url"),
            Some("http://localhost:9000/hook")
        );
        assert!(config.get_bool("webhook", "enabled", false));
    }

    #[test]
    fn get_bool_defaults() {
        let mut config = Config::new();
        assert!(!config.get_bool("webhook", "enabled", false));
        config.set_value("webhook", "enabled", "true").unwrap();
        assert!(config.get_bool("webhook", "enabled", false));
    }

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        let mut config = Config::new();
        config.set_value("smtp", "port", "lots").unwrap();
        assert_eq!(config.get_int("smtp", "port", 2500), 2500);
    }
}
