use core::time::Duration;

use hashbrown::HashMap;
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

mod constants {
    macro_rules! env_or_default {
        ($name:expr, $default:expr) => {
            if let Some(s) = option_env!($name) {
                s
            } else {
                $default
            }
        };
    }

    pub const PORTAL_URL: &str = env_or_default!("MANAGEBAC_URL", "https://shtcs.managebac.cn");
    pub const TIMEOUT_MS: u64 = 30_000;
    pub const VIEWS: [&str; 3] = ["pending", "overdue", "submitted"];
    pub const DETAILS_LIMIT: usize = 10;
}

/// Everything the pipeline reads. Loaded by the caller; never mutated here.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub email: String,
    pub password: String,
    #[serde(alias = "portalURL", alias = "url")]
    pub portal_url: String,
    pub headless: bool,
    pub timeout_ms: u64,
    pub views_to_check: Vec<String>,
    pub debug: bool,
    /// Per-view path (relative to the portal) or absolute URL.
    pub view_paths: HashMap<String, String>,
    /// Visit assignment pages for description, teacher and attachments.
    pub fetch_details: bool,
    /// Most assignment pages read per run.
    pub details_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            portal_url: constants::PORTAL_URL.to_owned(),
            headless: true,
            timeout_ms: constants::TIMEOUT_MS,
            views_to_check: constants::VIEWS.map(ToOwned::to_owned).to_vec(),
            debug: false,
            view_paths: HashMap::new(),
            fetch_details: false,
            details_limit: constants::DETAILS_LIMIT,
        }
    }
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("portal_url", &self.portal_url)
            .field("headless", &self.headless)
            .field("timeout_ms", &self.timeout_ms)
            .field("views_to_check", &self.views_to_check)
            .field("debug", &self.debug)
            .field("fetch_details", &self.fetch_details)
            .field("details_limit", &self.details_limit)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_json(reader: impl std::io::Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(&self.email, &self.password, &self.portal_url)
    }

    pub fn validate(&self) -> Result<Credentials, ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.credentials()
    }
}

/// Login credentials plus the portal they belong to.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
    base: Url,
}

impl Credentials {
    pub fn new(email: &str, password: &str, portal_url: &str) -> Result<Self, ConfigError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ConfigError::Empty("email"));
        }
        if password.is_empty() {
            return Err(ConfigError::Empty("password"));
        }

        Ok(Self {
            email: email.to_owned(),
            password: password.to_owned(),
            base: parse_base(portal_url)?,
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .field("base", &self.base.as_str())
            .finish()
    }
}

/// Absolute http(s) URL, normalized to end with `/` so that joins stay below it.
pub fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    let fail = |reason: &str| ConfigError::Url {
        url: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::Empty("portal url"));
    }
    let mut url = Url::parse(raw).map_err(|e| fail(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(fail("scheme must be http or https"));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(fail("not an absolute url"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.headless);
        assert!(!config.debug);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.views_to_check, ["pending", "overdue", "submitted"]);
        assert!(!config.fetch_details);
        assert_eq!(config.details_limit, 10);
    }

    #[test]
    fn reads_camel_case_json() {
        let json = br#"{
            "email": "student@example.com",
            "password": "hunter2",
            "portalURL": "https://school.managebac.com",
            "headless": false,
            "timeoutMs": 5000,
            "viewsToCheck": ["overdue"],
            "viewPaths": { "overdue": "/student/overdue" },
            "fetchDetails": true,
            "detailsLimit": 3
        }"#;
        let config = Config::from_json(&json[..]).unwrap();
        assert_eq!(config.portal_url, "https://school.managebac.com");
        assert!(!config.headless);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.views_to_check, ["overdue"]);
        assert_eq!(config.view_paths["overdue"], "/student/overdue");
        assert!(config.fetch_details);
        assert_eq!(config.details_limit, 3);
        assert!(!config.debug);
    }

    #[test]
    fn rejects_missing_credentials() {
        let config = Config {
            email: "  ".to_owned(),
            password: "x".to_owned(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Empty("email"))));

        let config = Config {
            email: "a@b.c".to_owned(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Empty("password"))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = Config {
            email: "a@b.c".to_owned(),
            password: "x".to_owned(),
            timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn base_url_must_be_absolute_http() {
        assert!(parse_base("school.managebac.com").is_err());
        assert!(parse_base("ftp://school.managebac.com").is_err());
        assert!(parse_base("mailto:someone@example.com").is_err());

        let url = parse_base("https://school.managebac.com/app?x=1").unwrap();
        assert_eq!(url.as_str(), "https://school.managebac.com/app/");
        assert_eq!(url.join("login").unwrap().as_str(), "https://school.managebac.com/app/login");
    }

    #[test]
    fn debug_output_hides_password() {
        let credentials = Credentials::new("a@b.c", "hunter2", "https://x.example").unwrap();
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("a@b.c"));

        let config = Config {
            password: "hunter2".to_owned(),
            ..Config::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
