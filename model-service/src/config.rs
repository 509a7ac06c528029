use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

use serde::Deserialize;

/// Service settings, read from the environment by [envy].
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_listen_addr")]
    pub host: Ipv4Addr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory uploaded model archives are written to.
    #[serde(default = "default_model_store")]
    pub model_store: PathBuf,

    /// Owner id recorded on models when the request carries no `owner-id` header.
    #[serde(default = "default_owner")]
    pub default_owner: String,

    /// Time the inference backend takes to make a deployed instance trigger-ready.
    #[serde(default = "default_deploy_settle_ms")]
    pub deploy_settle_ms: u64,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    #[serde(default = "default_github_raw_url")]
    pub github_raw_url: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Largest `image_url` body a trigger downloads.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,

    /// Finished deploy operations kept for polling.
    #[serde(default = "default_finished_operations")]
    pub finished_operations: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn deploy_settle(&self) -> Duration {
        Duration::from_millis(self.deploy_settle_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: default_listen_addr(),
            port: default_port(),
            grpc_port: default_grpc_port(),
            db_path: default_db_path(),
            model_store: default_model_store(),
            default_owner: default_owner(),
            deploy_settle_ms: default_deploy_settle_ms(),
            github_api_url: default_github_api_url(),
            github_raw_url: default_github_raw_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            max_input_bytes: default_max_input_bytes(),
            finished_operations: default_finished_operations(),
        }
    }
}

fn default_listen_addr() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_port() -> u16 {
    8083
}

fn default_grpc_port() -> u16 {
    8084
}

fn default_db_path() -> String {
    String::from("model.db")
}

fn default_model_store() -> PathBuf {
    PathBuf::from("model-store")
}

fn default_owner() -> String {
    String::from("local-user")
}

fn default_deploy_settle_ms() -> u64 {
    5000
}

fn default_github_api_url() -> String {
    String::from("https://api.github.com")
}

fn default_github_raw_url() -> String {
    String::from("https://raw.githubusercontent.com")
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_max_input_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_finished_operations() -> usize {
    256
}

#[cfg(test)]
mod test {
    use super::Settings;

    #[test]
    pub fn env_overrides_defaults() {
        let vars = vec![
            ("PORT".to_owned(), "9090".to_owned()),
            ("DEFAULT_OWNER".to_owned(), "instill-ai".to_owned()),
            ("DEPLOY_SETTLE_MS".to_owned(), "250".to_owned()),
            ("MAX_INPUT_BYTES".to_owned(), "1024".to_owned()),
        ];
        let settings: Settings = envy::from_iter(vars).unwrap();

        assert_eq!(settings.port, 9090);
        assert_eq!(settings.grpc_port, 8084);
        assert_eq!(settings.max_input_bytes, 1024);
        assert_eq!(settings.finished_operations, 256);
        assert_eq!(settings.default_owner, "instill-ai");
        assert_eq!(settings.deploy_settle().as_millis(), 250);
        assert_eq!(settings.db_path, "model.db");
        assert_eq!(settings.host.to_string(), "127.0.0.1");
    }

    #[test]
    pub fn bad_port_is_rejected() {
        let vars = vec![("PORT".to_owned(), "not-a-port".to_owned())];
        assert!(envy::from_iter::<_, Settings>(vars).is_err());
    }
}
