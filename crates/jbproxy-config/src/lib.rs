//! Loads the proxy's YAML configuration file into typed properties.
//!
//! Mirrors the upstream server's configuration conventions: keys may use
//! hyphens or underscores interchangeably, every scalar field can be
//! overridden by a `JETBRAINS_PROXY_MCP_SERVER_*` environment variable, and
//! a missing config file is a distinct error from a malformed one so the
//! caller can report 404 vs. 400 to the client that asked for it.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_yaml::Value;

const CONFIG_PATH_ENV: &str = "JETBRAINS_PROXY_MCP_SERVER_CONFIG";

/// Error loading or parsing the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No config file found at the resolved path. Maps to protocol error
    /// code 404.
    #[error("config file not found at {0}")]
    NotFound(PathBuf),
    /// The file exists but is not valid YAML, or a field has the wrong
    /// shape. Maps to protocol error code 400.
    #[error("failed to parse config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    /// The file exists but could not be read (permissions, I/O error).
    /// Maps to protocol error code 400.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// The protocol error code this failure should surface as.
    pub fn code(&self) -> u16 {
        match self {
            ConfigError::NotFound(_) => 404,
            ConfigError::Invalid { .. } | ConfigError::Io { .. } => 400,
        }
    }
}

/// One upstream JetBrains IDE MCP tool server the proxy connects to.
#[derive(Debug, Clone, PartialEq)]
pub struct JetbrainsMcpServer {
    pub name: String,
    pub url: String,
    pub headers: Option<HashMap<String, String>>,
    pub timeout: Duration,
    pub sse_read_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub client_path_type: String,
    pub server_path_type: String,
    pub debug_enabled: bool,
}

impl Default for JetbrainsMcpServer {
    fn default() -> Self {
        Self {
            name: "jetbrains-mcp-server".to_string(),
            url: "http://127.0.0.1:64342/sse".to_string(),
            headers: None,
            timeout: Duration::from_secs_f64(35.0),
            sse_read_timeout: Duration::from_secs_f64(300.0),
            start_timeout: Duration::from_secs_f64(120.0),
            stop_timeout: Duration::from_secs_f64(30.0),
            max_attempts: 5,
            initial_backoff: Duration::from_secs_f64(1.0),
            max_backoff: Duration::from_secs_f64(60.0),
            backoff_multiplier: 3.0,
            client_path_type: "wsl".to_string(),
            server_path_type: "windows".to_string(),
            debug_enabled: true,
        }
    }
}

/// Top-level proxy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct McpServerProperties {
    pub server_name: String,
    pub transport: String,
    pub sse_transport_endpoint: String,
    pub sse_bind_host: String,
    pub sse_port: u16,
    pub sse_debug_enabled: bool,
    pub timeout: Duration,
    pub jetbrains_mcp_server: JetbrainsMcpServer,
}

impl Default for McpServerProperties {
    fn default() -> Self {
        Self {
            server_name: "Jetbrains Proxy MCP Server".to_string(),
            transport: "sse".to_string(),
            sse_transport_endpoint: "/messages/".to_string(),
            sse_bind_host: "0.0.0.0".to_string(),
            sse_port: 41110,
            sse_debug_enabled: true,
            timeout: Duration::from_secs_f64(60.0),
            jetbrains_mcp_server: JetbrainsMcpServer::default(),
        }
    }
}

/// Resolves the config file path: an explicit `--config` flag wins, then
/// `JETBRAINS_PROXY_MCP_SERVER_CONFIG`, then `./config.yaml` if present,
/// falling back to `~/.config/jetbrains-proxy-mcp-server/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    let cwd_config = PathBuf::from("config.yaml");
    if cwd_config.is_file() {
        return cwd_config;
    }
    dirs::home_dir()
        .map(|home| {
            home.join(".config")
                .join("jetbrains-proxy-mcp-server")
                .join("config.yaml")
        })
        .unwrap_or(cwd_config)
}

/// Loads and parses the configuration at `path`, applying environment
/// variable overrides on top of whatever the file specifies.
pub fn load(path: &Path) -> Result<McpServerProperties, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: Value = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;

    let map = normalize_keys(&raw);
    Ok(properties_from_map(&map))
}

/// Recursively rewrites hyphenated mapping keys to underscored ones so
/// `sse-port` and `sse_port` are equivalent in the config file.
fn normalize_keys(value: &Value) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    if let Value::Mapping(mapping) = value {
        for (k, v) in mapping {
            if let Some(key) = k.as_str() {
                out.insert(key.replace('-', "_"), v.clone());
            }
        }
    }
    out
}

fn get_str_property(map: &HashMap<String, Value>, key: &str, env_name: &str, default: &str) -> String {
    if let Ok(v) = env::var(env_name) {
        return v;
    }
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

fn get_u16_property(map: &HashMap<String, Value>, key: &str, env_name: &str, default: u16) -> u16 {
    if let Ok(v) = env::var(env_name) {
        if let Ok(parsed) = v.parse() {
            return parsed;
        }
        log::warn!("invalid value for {env_name}: {v}, using default {default}");
    }
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u16::try_from(n).ok())
        .unwrap_or(default)
}

fn get_u32_property(map: &HashMap<String, Value>, key: &str, env_name: &str, default: u32) -> u32 {
    if let Ok(v) = env::var(env_name) {
        if let Ok(parsed) = v.parse() {
            return parsed;
        }
        log::warn!("invalid value for {env_name}: {v}, using default {default}");
    }
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(default)
}

fn get_duration_secs_property(
    map: &HashMap<String, Value>,
    key: &str,
    env_name: &str,
    default: Duration,
) -> Duration {
    if let Ok(v) = env::var(env_name) {
        if let Ok(parsed) = v.parse::<f64>() {
            return Duration::from_secs_f64(parsed);
        }
        log::warn!("invalid value for {env_name}: {v}, using default {default:?}");
    }
    map.get(key)
        .and_then(Value::as_f64)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

fn get_f64_property(map: &HashMap<String, Value>, key: &str, env_name: &str, default: f64) -> f64 {
    if let Ok(v) = env::var(env_name) {
        if let Ok(parsed) = v.parse() {
            return parsed;
        }
        log::warn!("invalid value for {env_name}: {v}, using default {default}");
    }
    map.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Accepts `true`/`yes`/`1`/`y`/`on` and `false`/`no`/`0`/`n`/`off`,
/// case-insensitively, for both the env var and the YAML scalar; anything
/// else falls back to `default`.
fn get_bool_property(map: &HashMap<String, Value>, key: &str, env_name: &str, default: bool) -> bool {
    if let Ok(v) = env::var(env_name) {
        if let Some(parsed) = parse_bool(&v) {
            return parsed;
        }
        log::warn!("invalid value for {env_name}: {v}, using default {default}");
    }
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => parse_bool(s).unwrap_or(default),
        _ => default,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" | "y" | "on" => Some(true),
        "false" | "no" | "0" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn properties_from_map(map: &HashMap<String, Value>) -> McpServerProperties {
    let defaults = McpServerProperties::default();

    let jetbrains_map = match map.get("jetbrains_mcp_server") {
        Some(v) => normalize_keys(v),
        None => HashMap::new(),
    };
    let jb_defaults = JetbrainsMcpServer::default();

    let jetbrains_mcp_server = JetbrainsMcpServer {
        name: get_str_property(
            &jetbrains_map,
            "name",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_NAME",
            &jb_defaults.name,
        ),
        url: get_str_property(
            &jetbrains_map,
            "url",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_URL",
            &jb_defaults.url,
        ),
        headers: jetbrains_map.get("headers").and_then(|v| {
            v.as_mapping().map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                    .collect()
            })
        }),
        timeout: get_duration_secs_property(
            &jetbrains_map,
            "timeout",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_TIMEOUT",
            jb_defaults.timeout,
        ),
        sse_read_timeout: get_duration_secs_property(
            &jetbrains_map,
            "sse_read_timeout",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_SSE_READ_TIMEOUT",
            jb_defaults.sse_read_timeout,
        ),
        start_timeout: get_duration_secs_property(
            &jetbrains_map,
            "start_timeout",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_START_TIMEOUT",
            jb_defaults.start_timeout,
        ),
        stop_timeout: get_duration_secs_property(
            &jetbrains_map,
            "stop_timeout",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_STOP_TIMEOUT",
            jb_defaults.stop_timeout,
        ),
        max_attempts: get_u32_property(
            &jetbrains_map,
            "max_attempts",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_MAX_ATTEMPTS",
            jb_defaults.max_attempts,
        ),
        initial_backoff: get_duration_secs_property(
            &jetbrains_map,
            "initial_backoff",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_INITIAL_BACKOFF",
            jb_defaults.initial_backoff,
        ),
        max_backoff: get_duration_secs_property(
            &jetbrains_map,
            "max_backoff",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_MAX_BACKOFF",
            jb_defaults.max_backoff,
        ),
        backoff_multiplier: get_f64_property(
            &jetbrains_map,
            "backoff_multiplier",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_BACKOFF_MULTIPLIER",
            jb_defaults.backoff_multiplier,
        ),
        client_path_type: get_str_property(
            &jetbrains_map,
            "client_path_type",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_CLIENT_PATH_TYPE",
            &jb_defaults.client_path_type,
        ),
        server_path_type: get_str_property(
            &jetbrains_map,
            "server_path_type",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_SERVER_PATH_TYPE",
            &jb_defaults.server_path_type,
        ),
        debug_enabled: get_bool_property(
            &jetbrains_map,
            "debug_enabled",
            "JETBRAINS_PROXY_MCP_SERVER_JETBRAINS_MCP_SERVER_DEBUG_ENABLED",
            jb_defaults.debug_enabled,
        ),
    };

    McpServerProperties {
        server_name: get_str_property(
            map,
            "server_name",
            "JETBRAINS_PROXY_MCP_SERVER_SERVER_NAME",
            &defaults.server_name,
        ),
        transport: get_str_property(
            map,
            "transport",
            "JETBRAINS_PROXY_MCP_SERVER_TRANSPORT",
            &defaults.transport,
        ),
        sse_transport_endpoint: get_str_property(
            map,
            "sse_transport_endpoint",
            "JETBRAINS_PROXY_MCP_SERVER_SSE_TRANSPORT_ENDPOINT",
            &defaults.sse_transport_endpoint,
        ),
        sse_bind_host: get_str_property(
            map,
            "sse_bind_host",
            "JETBRAINS_PROXY_MCP_SERVER_SSE_BIND_HOST",
            &defaults.sse_bind_host,
        ),
        sse_port: get_u16_property(
            map,
            "sse_port",
            "JETBRAINS_PROXY_MCP_SERVER_SSE_PORT",
            defaults.sse_port,
        ),
        sse_debug_enabled: get_bool_property(
            map,
            "sse_debug_enabled",
            "JETBRAINS_PROXY_MCP_SERVER_SSE_DEBUG_ENABLED",
            defaults.sse_debug_enabled,
        ),
        timeout: get_duration_secs_property(
            map,
            "timeout",
            "JETBRAINS_PROXY_MCP_SERVER_TIMEOUT",
            defaults.timeout,
        ),
        jetbrains_mcp_server,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert_eq!(err.code(), 404);
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn invalid_yaml_is_code_400() {
        let f = write_config("not: [valid: yaml");
        let err = load(f.path()).unwrap_err();
        assert_eq!(err.code(), 400);
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn defaults_apply_when_file_is_empty() {
        let f = write_config("{}");
        let props = load(f.path()).unwrap();
        assert_eq!(props.sse_port, 41110);
        assert_eq!(props.jetbrains_mcp_server.max_attempts, 5);
        assert_eq!(props.jetbrains_mcp_server.client_path_type, "wsl");
    }

    #[test]
    fn hyphenated_keys_are_accepted() {
        let f = write_config("sse-port: 9000\nserver-name: Custom\n");
        let props = load(f.path()).unwrap();
        assert_eq!(props.sse_port, 9000);
        assert_eq!(props.server_name, "Custom");
    }

    #[test]
    fn nested_jetbrains_server_overrides() {
        let f = write_config(
            "jetbrains-mcp-server:\n  url: http://example:1234/sse\n  max-attempts: 7\n",
        );
        let props = load(f.path()).unwrap();
        assert_eq!(props.jetbrains_mcp_server.url, "http://example:1234/sse");
        assert_eq!(props.jetbrains_mcp_server.max_attempts, 7);
    }

    #[test]
    fn bool_property_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn resolve_config_path_prefers_explicit() {
        let explicit = Path::new("/tmp/explicit-config.yaml");
        assert_eq!(resolve_config_path(Some(explicit)), explicit);
    }
}
