use log::warn;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Default config file locations, checked in order.
pub const CONFIG_PATHS: [&str; 2] = ["./rtspipe.toml", "./config.toml"];

/// Knobs for the RTSP session state machine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sent as `User-Agent` on every request
    pub user_agent: String,
    /// Consecutive failed keepalives tolerated before the session fails
    pub keepalive_retries: u32,
    /// Retries of a request answered with 401
    pub auth_retries: u32,
    /// How long a request may stay unanswered
    pub request_timeout: Duration,
    /// Used when the server's `Session` header carries no timeout
    pub default_session_timeout: Duration,
    /// Keepalives go out this long before the session timeout expires
    pub keepalive_margin: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("rtspipe/{}", env!("CARGO_PKG_VERSION")),
            keepalive_retries: 2,
            auth_retries: 1,
            request_timeout: Duration::from_secs(10),
            default_session_timeout: Duration::from_secs(60),
            keepalive_margin: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Sets the keepalive retry budget.
    pub fn with_keepalive_retries(mut self, retries: u32) -> Self {
        self.keepalive_retries = retries;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the User-Agent header value.
    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = agent.to_string();
        self
    }
}

/// Knobs for the fragmenting muxer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Access units that may arrive out of decode order and still be placed
    pub reorder_window: usize,
    /// Target duration of one media fragment
    pub fragment_duration: Duration,
    /// Upper bound on samples per fragment
    pub max_samples_per_fragment: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            reorder_window: 1,
            fragment_duration: Duration::from_millis(1000),
            max_samples_per_fragment: 256,
        }
    }
}

impl MuxConfig {
    /// Sets the reorder lookback window.
    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    /// Sets the fragment duration target.
    pub fn with_fragment_duration(mut self, duration: Duration) -> Self {
        self.fragment_duration = duration;
        self
    }

    /// Sets the per-fragment sample cap.
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples_per_fragment = max.max(1);
        self
    }
}

/// Retention policy of the buffered media sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Appends between two retention sweeps
    pub trim_interval: usize,
    /// Media kept behind the current position
    pub retention: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            trim_interval: 100,
            retention: Duration::from_secs(10),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stream to ingest
    pub rtsp_url: String,
    /// Overrides credentials embedded in the URL
    pub username: Option<String>,
    /// Password paired with `username`
    pub password: Option<String>,
    /// Session settings
    pub session: SessionConfig,
    /// Muxer settings
    pub mux: MuxConfig,
    /// Buffered sink settings
    pub sink: SinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtsp_url: String::from("rtsp://example.com:554/stream"),
            username: None,
            password: None,
            session: SessionConfig::default(),
            mux: MuxConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    /// Builds a config from defaults, then `RTSPIPE_*` environment variables,
    /// then the first config file found in [`CONFIG_PATHS`].
    pub fn load() -> Self {
        let mut config = Config::default();
        config.apply_env();
        for path in CONFIG_PATHS {
            if let Ok(content) = std::fs::read_to_string(path) {
                config.apply_text(&content);
                break;
            }
        }
        config
    }

    /// Builds a config from defaults overlaid with the given file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Config::default();
        config.apply_text(&content);
        Ok(config)
    }

    fn apply_env(&mut self) {
        const KEYS: [&str; 11] = [
            "rtsp_url",
            "username",
            "password",
            "user_agent",
            "keepalive_retries",
            "auth_retries",
            "request_timeout_ms",
            "keepalive_margin_ms",
            "reorder_window",
            "fragment_duration_ms",
            "max_samples_per_fragment",
        ];
        for key in KEYS {
            if let Ok(value) = env::var(format!("RTSPIPE_{}", key.to_ascii_uppercase())) {
                self.set(key, &value);
            }
        }
    }

    /// Applies `key = value` lines; `#` starts a comment.
    pub fn apply_text(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        fn millis(value: &str) -> Option<Duration> {
            value.parse::<u64>().ok().map(Duration::from_millis)
        }

        let applied = match key {
            "rtsp_url" => {
                if !value.is_empty() {
                    self.rtsp_url = value.to_string();
                }
                !value.is_empty()
            }
            "username" => {
                self.username = Some(value.to_string());
                true
            }
            "password" => {
                self.password = Some(value.to_string());
                true
            }
            "user_agent" => {
                self.session.user_agent = value.to_string();
                true
            }
            "keepalive_retries" => value
                .parse()
                .map(|v| self.session.keepalive_retries = v)
                .is_ok(),
            "auth_retries" => value.parse().map(|v| self.session.auth_retries = v).is_ok(),
            "request_timeout_ms" => millis(value)
                .map(|v| self.session.request_timeout = v)
                .is_some(),
            "keepalive_margin_ms" => millis(value)
                .map(|v| self.session.keepalive_margin = v)
                .is_some(),
            "reorder_window" => value.parse().map(|v| self.mux.reorder_window = v).is_ok(),
            "fragment_duration_ms" => millis(value)
                .map(|v| self.mux.fragment_duration = v)
                .is_some(),
            "max_samples_per_fragment" => value
                .parse::<usize>()
                .map(|v| self.mux.max_samples_per_fragment = v.max(1))
                .is_ok(),
            "retention_ms" => millis(value).map(|v| self.sink.retention = v).is_some(),
            "trim_interval" => value.parse().map(|v| self.sink.trim_interval = v).is_ok(),
            _ => {
                warn!("Ignoring unknown config key '{}'", key);
                true
            }
        };

        if !applied {
            warn!("Ignoring invalid value '{}' for config key '{}'", value, key);
        }
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# rtspipe configuration
# Values here override RTSPIPE_* environment variables.

rtsp_url = "rtsp://example.com:554/stream"
# username = "admin"
# password = "secret"

# keepalive_retries = 2
# auth_retries = 1
# request_timeout_ms = 10000
# keepalive_margin_ms = 5000

# reorder_window = 1
# fragment_duration_ms = 1000
# max_samples_per_fragment = 256

# retention_ms = 10000
# trim_interval = 100
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session.keepalive_retries, 2);
        assert_eq!(config.session.auth_retries, 1);
        assert_eq!(config.mux.reorder_window, 1);
        assert_eq!(config.sink.trim_interval, 100);
    }

    #[test]
    fn test_apply_text() {
        let mut config = Config::default();
        config.apply_text(
            "# comment\nrtsp_url = \"rtsp://cam.local/live\"\nreorder_window = 4\nfragment_duration_ms = 500\nkeepalive_retries = nope\n",
        );
        assert_eq!(config.rtsp_url, "rtsp://cam.local/live");
        assert_eq!(config.mux.reorder_window, 4);
        assert_eq!(config.mux.fragment_duration, Duration::from_millis(500));
        assert_eq!(config.session.keepalive_retries, 2);
    }

    #[test]
    fn test_template_round_trip() {
        let path = env::temp_dir().join(format!("rtspipe-template-{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);
        create_default_config_template(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.rtsp_url, "rtsp://example.com:554/stream");
        std::fs::remove_file(&path).unwrap();
    }
}
