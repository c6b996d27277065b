use std::env;

use tracing::warn;

pub const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org";

pub struct Config {
    pub service_url: String,
    pub anon_key: String,
    pub geocode_url: String,
}

impl Config {
    /// A missing required variable is a startup error, not a fatal one. The
    /// clients are still constructed and every remote call then fails at call
    /// time.
    pub fn load() -> Self {
        Self {
            service_url: require("TRASH_SUPABASE_URL"),
            anon_key: require("TRASH_SUPABASE_ANON_KEY"),
            geocode_url: or_default("TRASH_GEOCODE_URL", DEFAULT_GEOCODE_URL),
        }
    }
}

fn require(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("Environment variable {key} not set, remote calls will fail");
        String::new()
    })
}

fn or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
