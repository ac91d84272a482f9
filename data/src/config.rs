use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `host` or `host:port`.
    pub address: String,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,

    pub nickname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    /// SASL PLAIN password; authentication is skipped when absent.
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub channels: Vec<String>,
    /// Patterns (substrings) that mark a message as a highlight; the
    /// nickname is used when empty.
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Executable invoked on highlights.
    #[serde(default)]
    pub on_highlight_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub typings: bool,
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }

    /// Splits the address into host and port, defaulting the port on
    /// the TLS flag.
    pub fn host_port(&self) -> (&str, u16) {
        let default_port = if self.tls { 6697 } else { 6667 };

        // The last colon separates the port unless it belongs to an
        // IPv6 literal
        match self.address.rsplit_once(':') {
            Some((host, port)) if !port.contains(']') && !host.is_empty() => port
                .parse()
                .map(|port| (host, port))
                .unwrap_or((self.address.as_str(), default_port)),
            _ => (self.address.as_str(), default_port),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_config() {
        let config: Config = toml::from_str(
            r#"
                address = "chat.sr.ht"
                nickname = "bob"
            "#,
        )
        .unwrap();

        assert!(config.tls);
        assert_eq!(config.username(), "bob");
        assert_eq!(config.host_port(), ("chat.sr.ht", 6697));
    }

    #[test]
    fn explicit_port_and_defaults() {
        let config: Config = toml::from_str(
            r##"
                address = "localhost:6667"
                tls = false
                nickname = "bob"
                username = "robert"
                channels = ["#rust", "#tokio"]
            "##,
        )
        .unwrap();

        assert_eq!(config.host_port(), ("localhost", 6667));
        assert_eq!(config.username(), "robert");
        assert_eq!(config.channels.len(), 2);
    }
}
