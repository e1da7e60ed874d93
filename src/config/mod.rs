use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional hex-string overrides for palette entries 0..15. Entries left as
/// `None` fall back to the standard/bright ANSI defaults computed in
/// [`crate::palette`]. The 16..231 color cube and 232..255 grayscale ramp are
/// derived by formula and are never configurable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaletteConfig {
    pub black: Option<String>,
    pub red: Option<String>,
    pub green: Option<String>,
    pub yellow: Option<String>,
    pub blue: Option<String>,
    pub magenta: Option<String>,
    pub cyan: Option<String>,
    pub white: Option<String>,
    pub bright_black: Option<String>,
    pub bright_red: Option<String>,
    pub bright_green: Option<String>,
    pub bright_yellow: Option<String>,
    pub bright_blue: Option<String>,
    pub bright_magenta: Option<String>,
    pub bright_cyan: Option<String>,
    pub bright_white: Option<String>,
}

impl PaletteConfig {
    /// The 16 entries in palette-index order, 0 (black) through 15
    /// (bright white).
    pub fn entries(&self) -> [&Option<String>; 16] {
        [
            &self.black, &self.red, &self.green, &self.yellow,
            &self.blue, &self.magenta, &self.cyan, &self.white,
            &self.bright_black, &self.bright_red, &self.bright_green, &self.bright_yellow,
            &self.bright_blue, &self.bright_magenta, &self.bright_cyan, &self.bright_white,
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FontsConfig {
    /// Additional fallback font paths, appended after any given via
    /// `--fallback` on the command line.
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub palette: PaletteConfig,
    #[serde(default)]
    pub fonts: FontsConfig,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        base.join("fbterm").join("config.toml")
    }

    /// Load a config file, falling back to in-memory defaults on any problem.
    ///
    /// Unlike a desktop app, this program may run from an initramfs with no
    /// writable `$HOME`, so a missing file is not an error and nothing is
    /// written back to disk.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("failed to parse config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("failed to read config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Parse a `#RRGGBB` string into a packed `0x00RRGGBB` value.
pub fn parse_hex_color(hex: &str) -> Option<u32> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_hex() {
        assert_eq!(parse_hex_color("#CD0000"), Some(0x00CD0000));
        assert_eq!(parse_hex_color("ffffff"), Some(0x00FFFFFF));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(parse_hex_color("#CD00"), None);
        assert_eq!(parse_hex_color("not-a-color"), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/fbterm/config.toml")));
        assert!(cfg.palette.black.is_none());
        assert!(cfg.fonts.fallback.is_empty());
    }
}
