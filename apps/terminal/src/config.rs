use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use flow_core::{FlowOptions, DEFAULT_SCHOOL_NAME, DEFAULT_SERVICE_FEE_BPS};
use serde::Serialize;

pub const CONFIG_FILE: &str = "master_fees.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub data_dir: Option<PathBuf>,
    pub strict_deep_links: bool,
    pub skip_tutorial: bool,
    pub service_fee_bps: u32,
    pub log_filter: String,
    pub school_fallback: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            strict_deep_links: false,
            skip_tutorial: false,
            service_fee_bps: DEFAULT_SERVICE_FEE_BPS,
            log_filter: "info".into(),
            school_fallback: DEFAULT_SCHOOL_NAME.into(),
        }
    }
}

impl Settings {
    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            strict_deep_links: self.strict_deep_links,
            skip_tutorial: self.skip_tutorial,
            service_fee_bps: self.service_fee_bps,
            fallback_school: self.school_fallback.clone(),
        }
    }

    pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => storage::default_data_dir(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Defaults, then `master_fees.toml` (or `config_path`), then `APP__*`
/// environment variables.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    load_settings_with(config_path, |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    config_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();
    let path = config_path.unwrap_or_else(|| Path::new(CONFIG_FILE));

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply(&mut settings, |key| file_cfg.get(key).cloned()),
            Err(err) => tracing::warn!(
                path = %path.display(),
                error = %err,
                "ignoring malformed config file"
            ),
        }
    }

    if let Some(v) = env("MASTER_FEES_DATA_DIR") {
        settings.data_dir = Some(PathBuf::from(v));
    }
    apply(&mut settings, |key| env(&format!("APP__{}", key.to_ascii_uppercase())));

    settings
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("data_dir").filter(|v| !v.trim().is_empty()) {
        settings.data_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("strict_deep_links").as_deref().and_then(parse_bool) {
        settings.strict_deep_links = v;
    }
    if let Some(v) = lookup("skip_tutorial").as_deref().and_then(parse_bool) {
        settings.skip_tutorial = v;
    }
    if let Some(v) = lookup("service_fee_basis_points") {
        if let Ok(parsed) = v.trim().parse::<u32>() {
            if parsed <= 10_000 {
                settings.service_fee_bps = parsed;
            }
        }
    }
    if let Some(v) = lookup("log_filter").filter(|v| !v.trim().is_empty()) {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("school_fallback").filter(|v| !v.trim().is_empty()) {
        settings.school_fallback = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
