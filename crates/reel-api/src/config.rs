//! API configuration.

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults_and_overrides() {
        for key in ["API_HOST", "API_PORT", "CORS_ORIGINS", "MAX_BODY_SIZE", "ENVIRONMENT"] {
            std::env::remove_var(key);
        }
        let config = ApiConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(!config.is_production());

        std::env::set_var("API_PORT", "9001");
        std::env::set_var("CORS_ORIGINS", "https://a.test, https://b.test");
        std::env::set_var("ENVIRONMENT", "Production");
        let config = ApiConfig::from_env();
        assert_eq!(config.port, 9001);
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert!(config.is_production());

        for key in ["API_PORT", "CORS_ORIGINS", "ENVIRONMENT"] {
            std::env::remove_var(key);
        }
    }
}
