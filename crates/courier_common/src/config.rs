use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Page-level site configuration.
///
/// This is the same object the server embeds into every page for its
/// scripts. Only the fields the courier crates read are modelled; unknown
/// fields are ignored when parsing.
///
/// ## Example
///
/// ```rust
/// use courier_common::SiteConfig;
///
/// let config = SiteConfig::from_json_str(
///     r#"{"wwwroot": "https://school.example", "sessiontimeout": 7200}"#,
/// ).unwrap();
///
/// assert_eq!(config.wwwroot, "https://school.example");
/// assert_eq!(config.theme, "boost");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// Site root without trailing slash, e.g. `https://school.example`.
    pub wwwroot: String,
    /// Session lifetime in seconds.
    pub sessiontimeout: u64,
    /// Name of the active theme.
    pub theme: String,
    /// Theme revision, used to version image URLs.
    pub themerev: i64,
    /// Whether the server accepts slash arguments in script URLs.
    pub slasharguments: bool,
    /// Session key of the current user.
    pub sesskey: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            wwwroot: "http://localhost".to_string(),
            sessiontimeout: 7200,
            theme: "boost".to_string(),
            themerev: -1,
            slasharguments: true,
            sesskey: String::new(),
        }
    }
}

impl SiteConfig {
    /// Parses a configuration object, filling absent fields with defaults.
    pub fn from_json_str(source: &str) -> Result<Self, RemoteError> {
        let mut config: SiteConfig = serde_json::from_str(source)?;
        config.wwwroot = config.wwwroot.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Builds an absolute URL below the site root.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.wwwroot, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_dropped() {
        let config = SiteConfig::from_json_str(r#"{"wwwroot": "https://a.example/moodle/"}"#).unwrap();
        assert_eq!(config.wwwroot, "https://a.example/moodle");
        assert_eq!(
            config.url("/lib/ajax/service.php"),
            "https://a.example/moodle/lib/ajax/service.php"
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config = SiteConfig::from_json_str(
            r#"{"wwwroot": "https://a.example", "developerdebug": true, "sessiontimeout": 600}"#,
        )
        .unwrap();
        assert_eq!(config.sessiontimeout, 600);
        assert!(config.slasharguments);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let result = SiteConfig::from_json_str("{wwwroot:");
        assert!(matches!(result, Err(RemoteError::Serialization(_))));
    }
}
