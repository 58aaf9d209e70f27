use serde::Deserialize;

/// Service configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Users handed to one blocking worker
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Overall deadline of one calibration run, in milliseconds
    #[serde(default)]
    pub run_deadline_ms: Option<u64>,

    /// List size used when a request does not carry its own config
    #[serde(default = "default_list_size")]
    pub default_list_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_batch_size() -> usize {
    crate::services::calibrator::DEFAULT_BATCH_SIZE
}

fn default_list_size() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            batch_size: default_batch_size(),
            run_deadline_ms: None,
            default_list_size: default_list_size(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Socket address the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.run_deadline_ms, None);
        assert_eq!(config.default_list_size, 10);
    }

    #[test]
    fn test_values_from_environment() {
        let config: Config = envy::from_iter(vec![
            ("PORT".to_string(), "8080".to_string()),
            ("BATCH_SIZE".to_string(), "16".to_string()),
            ("RUN_DEADLINE_MS".to_string(), "2500".to_string()),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.run_deadline_ms, Some(2500));
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }
}
