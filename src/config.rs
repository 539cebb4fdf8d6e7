//! Layered configuration: CLI flags > environment variables > TOML file > compiled defaults
//! (§6.3, SPEC_FULL.md §2.1), following the donor's `Config::load()` precedence exactly.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub tier_cache: TierCacheConfig,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `OPENROUTER_API_KEY` — the primary LLM router.
    pub openrouter_api_key: Option<String>,
    /// `OPENAI_API_KEY` — optional BYOK passthrough for OpenAI-family models.
    pub openai_api_key: Option<String>,
    /// `ANTHROPIC_API_KEY` — optional BYOK passthrough for Claude-family models.
    pub anthropic_api_key: Option<String>,
    pub model_config_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub sendgrid_api_key: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub app_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_key: Option<String>,
    pub bucket: String,
    /// Local filesystem root standing in for the object store bucket (§6.2).
    pub local_root: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierCacheConfig {
    /// TierResolver cache TTL in seconds (§4.4 default: 5 minutes).
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub ttl_secs: u64,
}

/// Command line argument overrides, highest priority (donor's `CommandLineArgs`).
#[derive(Parser, Debug, Clone)]
#[command(name = "oracle-health")]
#[command(version, about = "Medical-assistant LLM orchestration backend")]
pub struct CommandLineArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub log_dir: Option<String>,

    #[arg(long, value_name = "DURATION")]
    pub tier_cache_ttl: Option<String>,
}

impl Config {
    /// Loading order (priority from highest to lowest): CLI > env > config file > defaults.
    pub fn load() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            self.llm.openrouter_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key);
        }

        if let Ok(key) = std::env::var("SENDGRID_API_KEY") {
            self.email.sendgrid_api_key = Some(key);
        }
        if let Ok(addr) = std::env::var("EMAIL_FROM_ADDRESS") {
            self.email.from_address = addr;
        }
        if let Ok(name) = std::env::var("EMAIL_FROM_NAME") {
            self.email.from_name = name;
        }
        if let Ok(url) = std::env::var("APP_URL") {
            self.email.app_url = url;
        }

        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.storage.supabase_url = Some(url);
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.storage.supabase_anon_key = Some(key);
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_ROLE_KEY"))
        {
            self.storage.supabase_service_key = Some(key);
        }
        if let Ok(bucket) = std::env::var("SUPABASE_STORAGE_BUCKET") {
            self.storage.bucket = bucket;
        }

        if let Ok(debug) = std::env::var("DEBUG") {
            self.debug = debug == "true" || debug == "1";
        }
    }

    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(dir) = &args.log_dir {
            self.logging.file = Some(format!("{dir}/oracle-health.log"));
        }
        if let Some(ttl) = &args.tier_cache_ttl {
            match parse_duration_to_secs(ttl) {
                Ok(val) => self.tier_cache.ttl_secs = val,
                Err(e) => tracing::warn!("invalid --tier-cache-ttl '{ttl}': {e}"),
            }
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("database URL cannot be empty");
        }
        if self.tier_cache.ttl_secs == 0 {
            anyhow::bail!("tier_cache.ttl_secs must be > 0");
        }
        if self.llm.openrouter_api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set; LLM calls will fail at the HTTP layer");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml"];
        possible_paths.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/oracle-health.db".to_string() }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            model_config_path: Some("config/models.json".to_string()),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: None,
            from_address: "noreply@example.com".to_string(),
            from_name: "Oracle Health".to_string(),
            app_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            supabase_service_key: None,
            bucket: "medical-photos".to_string(),
            local_root: "data/photos".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,oracle_health=debug".to_string(), file: None }
    }
}

impl Default for TierCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }
    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {unit}")),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
