//! Strongly typed primitive inputs and outputs

use crate::error::DeviceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Screen coordinate in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub(crate) fn validate(&self) -> Result<(), DeviceError> {
        if self.x < 0 || self.y < 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "coordinates must be non-negative, got ({}, {})",
                self.x, self.y
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Android key codes used by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Home,
    Back,
    Call,
    VolumeUp,
    VolumeDown,
    Power,
    Tab,
    Space,
    Enter,
    Delete,
    Menu,
    Search,
    AppSwitch,
    /// Any other `KEYCODE_*` value
    Other(u16),
}

impl KeyCode {
    /// Numeric `KEYCODE_*` value
    pub fn code(&self) -> u16 {
        match self {
            KeyCode::Home => 3,
            KeyCode::Back => 4,
            KeyCode::Call => 5,
            KeyCode::VolumeUp => 24,
            KeyCode::VolumeDown => 25,
            KeyCode::Power => 26,
            KeyCode::Tab => 61,
            KeyCode::Space => 62,
            KeyCode::Enter => 66,
            KeyCode::Delete => 67,
            KeyCode::Menu => 82,
            KeyCode::Search => 84,
            KeyCode::AppSwitch => 187,
            KeyCode::Other(code) => *code,
        }
    }
}

impl FromStr for KeyCode {
    type Err = DeviceError;

    /// Accepts a key name (`home`, `KEYCODE_BACK`, `volume_up`) or a number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = name.strip_prefix("keycode_").unwrap_or(&name);

        let key = match name {
            "home" => KeyCode::Home,
            "back" => KeyCode::Back,
            "call" => KeyCode::Call,
            "volume_up" => KeyCode::VolumeUp,
            "volume_down" => KeyCode::VolumeDown,
            "power" => KeyCode::Power,
            "tab" => KeyCode::Tab,
            "space" => KeyCode::Space,
            "enter" => KeyCode::Enter,
            "delete" | "del" => KeyCode::Delete,
            "menu" => KeyCode::Menu,
            "search" => KeyCode::Search,
            "app_switch" | "recents" => KeyCode::AppSwitch,
            other => other.parse::<u16>().map(KeyCode::Other).map_err(|_| {
                DeviceError::InvalidArgument(format!("unknown key code '{}'", s))
            })?,
        };
        Ok(key)
    }
}

/// Display resolution reported by `wm size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    /// Parse `wm size` output, preferring an override over the physical size
    pub(crate) fn parse_wm_size(output: &str) -> Option<Self> {
        let parse_line = |prefix: &str| {
            output.lines().find_map(|line| {
                let value = line.trim().strip_prefix(prefix)?.trim();
                let (w, h) = value.split_once('x')?;
                Some(ScreenSize {
                    width: w.trim().parse().ok()?,
                    height: h.trim().parse().ok()?,
                })
            })
        };
        parse_line("Override size:").or_else(|| parse_line("Physical size:"))
    }
}

/// Handle to a screenshot written into the cache directory.
/// The caller owns the file and is responsible for deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenCapture {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// Encode text for `input text`, which treats `%s` as a space
pub(crate) fn encode_input_text(text: &str) -> Result<String, DeviceError> {
    if text.is_empty() {
        return Err(DeviceError::InvalidArgument("text must not be empty".into()));
    }
    if let Some(c) = text.chars().find(|c| !c.is_ascii() || c.is_ascii_control()) {
        return Err(DeviceError::InvalidArgument(format!(
            "`input text` cannot type {:?}",
            c
        )));
    }
    Ok(text.replace(' ', "%s"))
}

/// Android package names: dot-separated segments of `[A-Za-z0-9_]`
pub(crate) fn validate_package(package: &str) -> Result<(), DeviceError> {
    let valid = !package.is_empty()
        && package.contains('.')
        && package.split('.').all(|segment| {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DeviceError::InvalidArgument(format!(
            "'{}' is not a valid package name",
            package
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_code_parsing() {
        assert_eq!("home".parse::<KeyCode>().unwrap(), KeyCode::Home);
        assert_eq!("KEYCODE_BACK".parse::<KeyCode>().unwrap(), KeyCode::Back);
        assert_eq!("recents".parse::<KeyCode>().unwrap().code(), 187);
        assert_eq!("120".parse::<KeyCode>().unwrap(), KeyCode::Other(120));
        assert!("warp_drive".parse::<KeyCode>().is_err());
    }

    #[test]
    fn test_wm_size_prefers_override() {
        let output = "Physical size: 1080x2400\nOverride size: 720x1600\n";
        assert_eq!(
            ScreenSize::parse_wm_size(output),
            Some(ScreenSize { width: 720, height: 1600 })
        );
        assert_eq!(
            ScreenSize::parse_wm_size("Physical size: 1080x2400"),
            Some(ScreenSize { width: 1080, height: 2400 })
        );
        assert_eq!(ScreenSize::parse_wm_size("garbage"), None);
    }

    #[test]
    fn test_encode_input_text() {
        assert_eq!(encode_input_text("hello world").unwrap(), "hello%sworld");
        assert!(encode_input_text("").is_err());
        assert!(encode_input_text("你好").is_err());
        assert!(encode_input_text("line\nbreak").is_err());
    }

    #[test]
    fn test_validate_package() {
        assert!(validate_package("com.android.settings").is_ok());
        assert!(validate_package("tv.danmaku.bili").is_ok());
        assert!(validate_package("settings").is_err());
        assert!(validate_package("com..evil").is_err());
        assert!(validate_package("com.evil; reboot").is_err());
    }

    #[test]
    fn test_negative_point_rejected() {
        assert!(Point::new(-1, 5).validate().is_err());
        assert!(Point::new(0, 0).validate().is_ok());
    }
}
