use crate::rar::*;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RECAPTCHA_ENDPOINT: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecaptchaSettings {
    /// Without a secret, every verification fails.
    pub secret: Option<String>,
    pub endpoint: String,
    /// Scores strictly above this value pass.
    pub threshold: f64,
}

impl Default for RecaptchaSettings {
    fn default() -> Self {
        RecaptchaSettings {
            secret: None,
            endpoint: DEFAULT_RECAPTCHA_ENDPOINT.to_string(),
            threshold: 0.5,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RarConfig {
    #[serde(rename = "sheetPath")]
    pub sheet_path: String,
    #[serde(rename = "sheetName")]
    pub sheet_name: String,
    #[serde(rename = "outboxDirectory")]
    pub outbox_directory: String,
    #[serde(rename = "stateDirectory")]
    pub state_directory: String,
    #[serde(rename = "itManagerEmail")]
    pub it_manager_email: String,
    pub organisation: String,
    #[serde(rename = "lockTimeoutSeconds")]
    pub lock_timeout_seconds: u64,
    /// When set, submissions are posted to this URL instead of the local sheet.
    #[serde(rename = "relayUrl")]
    pub relay_url: Option<String>,
    pub recaptcha: RecaptchaSettings,
    #[serde(rename = "ipLookupUrl")]
    pub ip_lookup_url: Option<String>,
    #[serde(rename = "httpTimeoutSeconds")]
    pub http_timeout_seconds: u64,
}

impl Default for RarConfig {
    fn default() -> Self {
        RarConfig {
            sheet_path: "RARresponses.csv".to_string(),
            sheet_name: "RARresponses".to_string(),
            outbox_directory: "outbox".to_string(),
            state_directory: ".rarform".to_string(),
            it_manager_email: "it-manager@example.com".to_string(),
            organisation: "LCA Teignbridge".to_string(),
            lock_timeout_seconds: 30,
            relay_url: None,
            recaptcha: RecaptchaSettings::default(),
            ip_lookup_url: None,
            http_timeout_seconds: 10,
        }
    }
}

impl RarConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.max(1))
    }

    /// Makes the relative paths of the configuration relative to the given directory.
    fn resolve(mut self, root: &Path) -> RarConfig {
        let join = |p: &str| -> String {
            if Path::new(p).is_absolute() {
                p.to_string()
            } else {
                root.join(p).display().to_string()
            }
        };
        self.sheet_path = join(&self.sheet_path);
        self.outbox_directory = join(&self.outbox_directory);
        self.state_directory = join(&self.state_directory);
        self
    }

    fn with_overrides<F>(mut self, lookup: F) -> RarConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("RAR_RECAPTCHA_SECRET").filter(|s| !s.is_empty()) {
            debug!("with_overrides: recaptcha secret taken from the environment");
            self.recaptcha.secret = Some(secret);
        }
        if let Some(url) = lookup("RAR_RELAY_URL") {
            debug!("with_overrides: relay url: {:?}", url);
            self.relay_url = if url.is_empty() { None } else { Some(url) };
        }
        self
    }
}

fn parse_config(contents: &str, root: &Path) -> RarResult<RarConfig> {
    let config: RarConfig = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    Ok(config.resolve(root))
}

/// Reads the configuration file, or falls back to the defaults when no file is given.
///
/// Paths in the file are relative to the directory of the file. The environment
/// variables `RAR_RECAPTCHA_SECRET` and `RAR_RELAY_URL` take precedence over the file.
pub fn read_config(path: Option<&str>) -> RarResult<RarConfig> {
    let config = match path {
        Some(p) => {
            let contents = fs::read_to_string(p).context(OpeningJsonSnafu { path: p })?;
            let root = Path::new(p)
                .parent()
                .map(|d| d.to_path_buf())
                .unwrap_or_default();
            parse_config(&contents, &root)?
        }
        None => RarConfig::default(),
    };
    let config = config.with_overrides(|k| std::env::var(k).ok());
    info!("read_config: {:?}", config.sheet_path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"{"sheetPath": "data/responses.csv", "lockTimeoutSeconds": 5,
                "recaptcha": {"threshold": 0.7}}"#,
            Path::new("/srv/rar"),
        )
        .expect("valid config");
        assert_eq!(config.sheet_path, "/srv/rar/data/responses.csv");
        assert_eq!(config.outbox_directory, "/srv/rar/outbox");
        assert_eq!(config.sheet_name, "RARresponses");
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.recaptcha.threshold, 0.7);
        assert_eq!(config.recaptcha.endpoint, DEFAULT_RECAPTCHA_ENDPOINT);
        assert_eq!(config.relay_url, None);
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = parse_config(r#"{"stateDirectory": "/var/lib/rar"}"#, Path::new("/etc"))
            .expect("valid config");
        assert_eq!(config.state_directory, "/var/lib/rar");
    }

    #[test]
    fn environment_overrides_file() {
        let config = RarConfig {
            relay_url: Some("https://relay.example.org".to_string()),
            ..RarConfig::default()
        }
        .with_overrides(|k| match k {
            "RAR_RECAPTCHA_SECRET" => Some("s3cret".to_string()),
            "RAR_RELAY_URL" => Some("".to_string()),
            _ => None,
        });
        assert_eq!(config.recaptcha.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.relay_url, None);
    }

    #[test]
    fn bad_json_is_reported() {
        let res = parse_config("{not json", Path::new("."));
        assert!(matches!(res, Err(RarError::ParsingJson { .. })));
    }
}
