use std::{
    env, fs,
    path::{Path, PathBuf},
};

use docwire_client::{ConnectionSettings, Host, TlsSettings};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "docwire.toml";

/// Shell configuration, read from TOML.
///
/// ```toml
/// host = "db.internal"
/// port = 27017
/// database = "app"
///
/// [connection]
/// app_name = "reports"
/// tls = { ca_path = "ca.pem" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub host: String,
    pub port: u16,
    /// Database commands run against.
    pub database: String,
    pub connection: ConnectionSettings,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: Host::DEFAULT_PORT,
            database: "admin".to_string(),
            connection: ConnectionSettings::default(),
        }
    }
}

impl ShellConfig {
    /// Load config from TOML, with environment variable overrides.
    ///
    /// The path is `path` if given, else `DOCWIRE_CONFIG`, else
    /// `docwire.toml`. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("DOCWIRE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut cfg = match fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ShellConfig::default(),
            Err(e) => return Err(e.into()),
        };
        cfg.apply_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    /// Apply DOCWIRE_* overrides looked up through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("DOCWIRE_HOST") {
            self.host = host;
        }

        if let Some(port) = var("DOCWIRE_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.port = port;
        }

        if let Some(ca) = var("DOCWIRE_TLS_CA") {
            let server_name = self.connection.tls.take().and_then(|tls| tls.server_name);
            self.connection.tls = Some(TlsSettings {
                ca_path: PathBuf::from(ca),
                server_name,
            });
        }
    }

    pub fn host(&self) -> Host {
        Host::new(self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, io::Write};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ShellConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.port, 27017);
        assert_eq!(cfg.database, "admin");
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
host = "db.internal"
database = "app"

[connection]
app_name = "reports"
connect_timeout_ms = 250
tls = {{ ca_path = "ca.pem", server_name = "db" }}
"#
        )
        .unwrap();

        let cfg = ShellConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.host, "db.internal");
        assert_eq!(cfg.port, 27017);
        assert_eq!(cfg.database, "app");
        assert_eq!(cfg.connection.app_name.as_deref(), Some("reports"));
        assert_eq!(cfg.connection.connect_timeout_ms, 250);
        assert_eq!(
            cfg.connection.tls,
            Some(TlsSettings {
                ca_path: PathBuf::from("ca.pem"),
                server_name: Some("db".into()),
            })
        );
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        assert!(ShellConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCWIRE_HOST", "10.0.0.5"),
            ("DOCWIRE_PORT", "27018"),
            ("DOCWIRE_TLS_CA", "/etc/docwire/ca.pem"),
        ]
        .into();

        let mut cfg = ShellConfig::default();
        cfg.connection.tls = Some(TlsSettings {
            ca_path: PathBuf::from("old.pem"),
            server_name: Some("db".into()),
        });
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.host(), Host::new("10.0.0.5", 27018));
        let tls = cfg.connection.tls.unwrap();
        assert_eq!(tls.ca_path, PathBuf::from("/etc/docwire/ca.pem"));
        assert_eq!(tls.server_name.as_deref(), Some("db"));
    }

    #[test]
    fn test_unparseable_port_override_ignored() {
        let mut cfg = ShellConfig::default();
        cfg.apply_overrides(|key| (key == "DOCWIRE_PORT").then(|| "http".to_string()));
        assert_eq!(cfg.port, 27017);
    }
}
