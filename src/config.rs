// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load wmiirc settings from TOML with defaults for every field.
// Author: Lukas Bower

//! Settings for the control loop.
//!
//! Every field has a default so an empty or missing file yields a usable
//! configuration. Colors are written as `"#RRGGBB #RRGGBB #RRGGBB"`
//! (foreground, background, border) exactly as the manager expects them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid TOML for [`Settings`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// A color triple is malformed.
    #[error("invalid color {0:?}: expected \"#RRGGBB #RRGGBB #RRGGBB\"")]
    Color(String),
}

/// Foreground, background and border colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Colors {
    /// Text color.
    pub foreground: u32,
    /// Fill color.
    pub background: u32,
    /// Border color.
    pub border: u32,
}

impl Colors {
    /// Build a triple from packed `0xRRGGBB` values.
    #[must_use]
    pub const fn new(foreground: u32, background: u32, border: u32) -> Self {
        Self {
            foreground,
            background,
            border,
        }
    }
}

/// Render a single packed color as `#RRGGBB`.
#[must_use]
pub fn hex(color: u32) -> String {
    format!("#{:06X}", color & 0x00ff_ffff)
}

impl fmt::Display for Colors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            hex(self.foreground),
            hex(self.background),
            hex(self.border)
        )
    }
}

impl FromStr for Colors {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::Color(value.to_owned());
        let mut parsed = [0u32; 3];
        let mut parts = value.split_whitespace();
        for slot in &mut parsed {
            let part = parts.next().ok_or_else(bad)?;
            let digits = part.strip_prefix('#').ok_or_else(bad)?;
            if digits.len() != 6 {
                return Err(bad());
            }
            *slot = u32::from_str_radix(digits, 16).map_err(|_| bad())?;
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        let [foreground, background, border] = parsed;
        Ok(Self::new(foreground, background, border))
    }
}

impl TryFrom<String> for Colors {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Menu program settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MenuSettings {
    /// dmenu executable.
    pub dmenu: String,
    /// wmii9menu executable.
    pub wmii9menu: String,
    /// Font passed to the menus; falls back to the manager font when empty.
    pub font: String,
    /// Colors of unselected items.
    pub normal_colors: Colors,
    /// Colors of the selected item.
    pub selection_colors: Colors,
    /// Show dmenu at the bottom of the screen.
    pub bottom: bool,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            dmenu: "dmenu".to_owned(),
            wmii9menu: "wmii9menu".to_owned(),
            font: String::new(),
            normal_colors: Colors::new(0xb6b4b8, 0x1c2636, 0x000000),
            selection_colors: Colors::new(0xffffff, 0x1c2636, 0x000000),
            bottom: true,
        }
    }
}

/// Status bar scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusbarSettings {
    /// Run the status bar plugins.
    pub enable: bool,
    /// Seconds between updates for plugins without their own interval.
    pub interval_secs: u64,
    /// Seconds between checks for dead plugin threads.
    pub watcher_secs: u64,
}

impl StatusbarSettings {
    /// Default plugin interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Watcher period.
    #[must_use]
    pub fn watcher_interval(&self) -> Duration {
        Duration::from_secs(self.watcher_secs.max(1))
    }
}

impl Default for StatusbarSettings {
    fn default() -> Self {
        Self {
            enable: true,
            interval_secs: 5,
            watcher_secs: 5,
        }
    }
}

/// All wmiirc settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Modifier used by the key bindings.
    pub modkey: String,
    /// Manager font.
    pub font: String,
    /// Colors of unfocused clients.
    pub normal_colors: Colors,
    /// Colors of the focused client.
    pub focus_colors: Colors,
    /// Colors of unfocused bar entries.
    pub bar_normal_colors: Colors,
    /// Colors of the focused bar entry.
    pub bar_focus_colors: Colors,
    /// Client border width.
    pub border: u32,
    /// Tag used as scratchpad.
    pub scratchpad: String,
    /// Capacity of the view history.
    pub history_size: usize,
    /// Terminal command bound to `Mod-Return`.
    pub terminal: String,
    /// Menu programs.
    pub menu: MenuSettings,
    /// `[display, tag]` pairs.
    pub tag_mapping: Vec<(String, String)>,
    /// Lines written to `/tagrules`.
    pub tag_rules: Vec<String>,
    /// Lines written to `/colrules`.
    pub col_rules: Vec<String>,
    /// Status bar scheduling.
    pub statusbar: StatusbarSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let pairs = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(display, tag)| ((*display).to_owned(), (*tag).to_owned()))
                .collect()
        };
        let lines = |lines: &[&str]| -> Vec<String> {
            lines.iter().map(|line| (*line).to_owned()).collect()
        };
        Self {
            modkey: "Mod4".to_owned(),
            font: "-artwiz-snap-*-*-*-*-*-100-*-*-*-*-*-*".to_owned(),
            normal_colors: Colors::new(0xb6b4b8, 0x1c2636, 0x0f1729),
            focus_colors: Colors::new(0xffffff, 0x1c2636, 0x0f1729),
            bar_normal_colors: Colors::new(0xa0a0a0, 0x505050, 0x404040),
            bar_focus_colors: Colors::new(0xffffff, 0x1c2636, 0x0f1729),
            border: 0,
            scratchpad: "_sp".to_owned(),
            history_size: 15,
            terminal: "x-terminal-emulator".to_owned(),
            menu: MenuSettings::default(),
            tag_mapping: pairs(&[
                ("mail", "01_mail"),
                ("browser", "02_browser"),
                ("irssi_downgra_de", "03_irssi_downgra_de"),
                ("irssi_logix_tt", "04_irssi_logix_tt"),
                ("logs", "05_logs"),
                ("sp", "_sp"),
            ]),
            tag_rules: lines(&[
                "/XMMS.*/ -> ~",
                "/MPlayer.*/ -> ~",
                "/Firefox.*/ -> 02_browser",
                "/Gimp.*/ -> gimp",
                "/logger_.*/ -> 05_logs",
                "/.*/ -> !",
                "/.*/ -> 1",
            ]),
            col_rules: lines(&["/05_logs/ -> 100", "/.*/ -> 50+50"]),
            statusbar: StatusbarSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Menu font, falling back to the manager font.
    #[must_use]
    pub fn menu_font(&self) -> &str {
        if self.menu.font.is_empty() {
            &self.font
        } else {
            &self.menu.font
        }
    }

    /// Display names of the mapped tags, in mapping order, scratchpad excluded.
    #[must_use]
    pub fn named_views(&self) -> Vec<String> {
        self.tag_mapping
            .iter()
            .filter(|(_, tag)| *tag != self.scratchpad)
            .map(|(display, _)| display.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn colors_render_upper_case() {
        let colors = Colors::new(0xb6b4b8, 0x1c2636, 0x0f1729);
        assert_eq!(colors.to_string(), "#B6B4B8 #1C2636 #0F1729");
        assert_eq!("#b6b4b8 #1C2636 #0f1729".parse::<Colors>().unwrap(), colors);
    }

    #[test]
    fn malformed_colors_are_rejected() {
        for bad in ["", "#ffffff #000000", "#ffffff #000000 #12345", "ffffff #000000 #123456", "#ffffff #000000 #123456 #000000"] {
            assert!(matches!(bad.parse::<Colors>(), Err(ConfigError::Color(_))), "{bad}");
        }
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::from_toml("", Path::new("empty.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.history_size, 15);
        assert_eq!(settings.named_views(), vec!["mail", "browser", "irssi_downgra_de", "irssi_logix_tt", "logs"]);
    }

    #[test]
    fn file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r##"
modkey = "Mod1"
bar_focus_colors = "#FFFFFF #000000 #111111"
tag_mapping = [["web", "02_web"]]

[statusbar]
interval_secs = 30
"##
        )
        .unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.modkey, "Mod1");
        assert_eq!(settings.bar_focus_colors, Colors::new(0xffffff, 0, 0x111111));
        assert_eq!(settings.tag_mapping, vec![("web".to_owned(), "02_web".to_owned())]);
        assert_eq!(settings.statusbar.interval(), Duration::from_secs(30));
        assert!(settings.statusbar.enable);
        assert_eq!(settings.scratchpad, "_sp");
    }

    #[test]
    fn unknown_keys_and_bad_colors_fail_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wmiirc.toml");
        fs::write(&path, "modkye = \"Mod1\"\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
        fs::write(&path, "focus_colors = \"red\"\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Settings::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn menu_font_falls_back_to_manager_font() {
        let mut settings = Settings::default();
        assert_eq!(settings.menu_font(), settings.font);
        settings.menu.font = "fixed".to_owned();
        assert_eq!(settings.menu_font(), "fixed");
    }
}
