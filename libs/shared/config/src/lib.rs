use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which record store backs the appointment cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreBackend {
    Memory,
    Supabase,
}

impl FromStr for RecordStoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(RecordStoreBackend::Memory),
            "supabase" | "postgrest" => Ok(RecordStoreBackend::Supabase),
            other => Err(format!("Unknown record store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_token: Option<String>,
    pub supabase_jwt_secret: String,
    pub record_store: RecordStoreBackend,
    pub max_appointments_per_day: usize,
    pub count_cancelled_toward_daily_limit: bool,
    pub enforce_status_transitions: bool,
    pub notification_buffer: usize,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_token: None,
            supabase_jwt_secret: String::new(),
            record_store: RecordStoreBackend::Memory,
            max_appointments_per_day: 3,
            count_cancelled_toward_daily_limit: true,
            enforce_status_transitions: false,
            notification_buffer: 256,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_token: env::var("SUPABASE_SERVICE_TOKEN").ok(),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            record_store: parse_var("RECORD_STORE", defaults.record_store),
            max_appointments_per_day: parse_var(
                "MAX_APPOINTMENTS_PER_DAY",
                defaults.max_appointments_per_day,
            ),
            count_cancelled_toward_daily_limit: parse_var(
                "COUNT_CANCELLED_TOWARD_DAILY_LIMIT",
                defaults.count_cancelled_toward_daily_limit,
            ),
            enforce_status_transitions: parse_var(
                "ENFORCE_STATUS_TRANSITIONS",
                defaults.enforce_status_transitions,
            ),
            notification_buffer: parse_var("NOTIFICATION_BUFFER", defaults.notification_buffer),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let store_ready = match self.record_store {
            RecordStoreBackend::Memory => true,
            RecordStoreBackend::Supabase => self.is_supabase_configured(),
        };

        store_ready && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_allows_three_appointments_per_day() {
        let config = AppConfig::default();
        assert_eq!(config.max_appointments_per_day, 3);
        assert!(config.count_cancelled_toward_daily_limit);
        assert!(!config.enforce_status_transitions);
        assert_eq!(config.record_store, RecordStoreBackend::Memory);
    }

    #[test]
    fn memory_backend_only_needs_jwt_secret() {
        let mut config = AppConfig::default();
        assert!(!config.is_configured());

        config.supabase_jwt_secret = "secret".to_string();
        assert!(config.is_configured());

        config.record_store = RecordStoreBackend::Supabase;
        assert!(!config.is_configured());
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Supabase".parse::<RecordStoreBackend>(), Ok(RecordStoreBackend::Supabase));
        assert_eq!("memory".parse::<RecordStoreBackend>(), Ok(RecordStoreBackend::Memory));
        assert!("mongo".parse::<RecordStoreBackend>().is_err());
    }
}
