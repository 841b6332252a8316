//! Default configuration file creation.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::private_path;

/// Write a commented default configuration to `path`, creating its directory.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let content = default_config_content();
    fs::write(path, content)
        .with_context(|| format!("Failed to write default config to {}", private_path(path)))?;

    log_block_start!("Created default configuration at {}", private_path(path));
    Ok(())
}

pub(crate) fn default_config_content() -> String {
    ConfigBuilder::new()
        .add_section("Automatic mode")
        .add_setting(
            "auto_mode",
            &format!("\"{DEFAULT_AUTO_MODE}\""),
            "Select: \"off\", \"custom\" or \"twilight\"",
        )
        .add_setting(
            "custom_start",
            &format!("\"{DEFAULT_CUSTOM_START}\""),
            "Fixed window start (HH:MM)",
        )
        .add_setting(
            "custom_end",
            &format!("\"{DEFAULT_CUSTOM_END}\""),
            "Fixed window end (HH:MM)",
        )
        .add_section("Activation")
        .add_setting(
            "activated",
            &DEFAULT_ACTIVATED.to_string(),
            "Manual activation flag at startup",
        )
        .add_section("Clock")
        .add_setting(
            "timezone",
            &format!("\"{DEFAULT_TIMEZONE}\""),
            "IANA timezone for the wall clock",
        )
        .add_section("Twilight")
        .add_setting(
            "sunset",
            &format!("\"{DEFAULT_SUNSET}\""),
            "Start of night for the twilight mode (HH:MM)",
        )
        .add_setting(
            "sunrise",
            &format!("\"{DEFAULT_SUNRISE}\""),
            "End of night for the twilight mode (HH:MM)",
        )
        .build()
}

/// Builds aligned `key = value  # comment` lines grouped under `#[Section]` headers.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        let width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                ConfigEntry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut lines = Vec::new();
        for (i, entry) in self.entries.into_iter().enumerate() {
            match entry {
                ConfigEntry::Section(header) => {
                    if i > 0 {
                        lines.push(String::new());
                    }
                    lines.push(header);
                }
                ConfigEntry::Setting { line, comment } => {
                    lines.push(format!("{line:width$}{comment}"));
                }
            }
        }
        lines.push(String::new());
        lines.join("\n")
    }
}
