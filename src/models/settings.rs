//! Settings Models
//!
//! Application configuration and settings data structures.

use serde::{Deserialize, Serialize};

/// Application configuration stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the remote analysis services
    pub service_base_url: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Interval between job status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Quiet period for case-limit adjustments in milliseconds
    pub case_limit_debounce_ms: u64,
    /// Default email for execution completion notifications
    #[serde(default)]
    pub notification_email: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            poll_interval_ms: 1500,
            case_limit_debounce_ms: 500,
            notification_email: None,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub service_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub case_limit_debounce_ms: Option<u64>,
    pub notification_email: Option<Option<String>>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.service_base_url {
            self.service_base_url = url;
        }
        if let Some(timeout) = update.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(interval) = update.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(debounce) = update.case_limit_debounce_ms {
            self.case_limit_debounce_ms = debounce;
        }
        if let Some(email) = update.notification_email {
            self.notification_email = email;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if url::Url::parse(&self.service_base_url).is_err() {
            return Err(format!(
                "Invalid service base URL: {}",
                self.service_base_url
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be at least 1 second".to_string());
        }

        if self.poll_interval_ms < 100 {
            return Err("Poll interval must be at least 100ms".to_string());
        }

        if let Some(email) = &self.notification_email {
            if !email.contains('@') {
                return Err(format!("Invalid notification email: {}", email));
            }
        }

        Ok(())
    }
}
