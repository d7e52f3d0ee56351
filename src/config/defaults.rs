use super::*;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_scheme: AuthScheme::ApiKeyHeader,
            request_timeout_secs: 15,
            vehicles_timeout_secs: 10,
            path_prefix: "/api/v1/ha".to_string(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/evlink.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { max_retained: 50 }
    }
}

fn default_environments() -> BTreeMap<String, String> {
    let mut envs = BTreeMap::new();
    envs.insert("prod".to_string(), "https://api.evlinkha.se".to_string());
    envs.insert(
        "sandbox".to_string(),
        "https://sandbox.api.evlinkha.se".to_string(),
    );
    envs
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: None,
            environments: default_environments(),
            api: ApiConfig::default(),
            activation_retry_secs: 60,
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}
