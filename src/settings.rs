use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagegen";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Lines of wrapped text per page for the plain-text backend
    #[serde(default = "default_lines_per_page")]
    pub lines_per_page: usize,

    #[serde(default = "default_chars_per_line")]
    pub chars_per_line: usize,

    /// Natural page size in points
    #[serde(default = "default_page_width")]
    pub page_width: f64,

    #[serde(default = "default_page_height")]
    pub page_height: f64,

    /// How long warnings and notices stay up; zero or less keeps them until
    /// dismissed
    #[serde(default = "default_notice_duration_ms")]
    pub notice_duration_ms: i32,

    /// Render asynchronous requests on worker threads
    #[serde(default = "default_true")]
    pub threaded: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_lines_per_page() -> usize {
    50
}

fn default_chars_per_line() -> usize {
    80
}

fn default_page_width() -> f64 {
    612.0
}

fn default_page_height() -> f64 {
    792.0
}

fn default_notice_duration_ms() -> i32 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            lines_per_page: default_lines_per_page(),
            chars_per_line: default_chars_per_line(),
            page_width: default_page_width(),
            page_height: default_page_height(),
            notice_duration_ms: default_notice_duration_ms(),
            threaded: true,
            log_level: default_log_level(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Replace the global settings with the contents of `path`.
///
/// Missing keys fall back to their defaults. A file that cannot be read or
/// parsed leaves the current settings untouched.
pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                sanitize(&mut settings);

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

/// A zero layout would produce documents without pages
fn sanitize(settings: &mut Settings) {
    if settings.lines_per_page == 0 {
        warn!("lines_per_page must be positive, using default");
        settings.lines_per_page = default_lines_per_page();
    }
    if settings.chars_per_line == 0 {
        warn!("chars_per_line must be positive, using default");
        settings.chars_per_line = default_chars_per_line();
    }
    if settings.page_width <= 0.0 || settings.page_height <= 0.0 {
        warn!("Page size must be positive, using default");
        settings.page_width = default_page_width();
        settings.page_height = default_page_height();
    }
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::from(SETTINGS_HEADER);

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!("lines_per_page: {}\n", settings.lines_per_page));
    content.push_str(&format!("chars_per_line: {}\n", settings.chars_per_line));
    content.push_str(&format!("page_width: {:?}\n", settings.page_width));
    content.push_str(&format!("page_height: {:?}\n", settings.page_height));
    content.push_str(&format!(
        "notice_duration_ms: {}\n",
        settings.notice_duration_ms
    ));
    content.push_str(&format!("threaded: {}\n", settings.threaded));
    content.push_str(&format!("log_level: \"{}\"\n", settings.log_level));

    content
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# pagegen settings
# ============================================================================
# lines_per_page / chars_per_line: plain-text page layout
# page_width / page_height: natural page size in points
# notice_duration_ms: 0 or less keeps notices until dismissed
# log_level: off, error, warn, info, debug or trace

"#;

// Public API for accessing/modifying settings

/// Copy of the current settings
pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn get_notice_duration_ms() -> i32 {
    SETTINGS
        .read()
        .map(|s| s.notice_duration_ms)
        .unwrap_or_else(|_| default_notice_duration_ms())
}

/// Configured log level; unknown names fall back to `Info`
pub fn get_log_level() -> LevelFilter {
    let name = SETTINGS
        .read()
        .map(|s| s.log_level.clone())
        .unwrap_or_else(|_| default_log_level());

    name.parse().unwrap_or_else(|_| {
        warn!("Unknown log level {name:?}, using info");
        LevelFilter::Info
    })
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    if let Ok(mut settings) = SETTINGS.write() {
        *settings = Settings::default();
    }
}
