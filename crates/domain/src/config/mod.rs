mod llm;
mod mcp;
mod server;

pub use llm::*;
pub use mcp::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// MCP (Model Context Protocol) server connections.
    #[serde(default)]
    pub mcp: McpConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Never fails fast:
    /// every field is checked so a single run of `sw doctor` reports every
    /// problem at once.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Server port must be non-zero.
        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        // Server host must not be empty.
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // Bearer token: absence is a warning unless require_auth is set.
        let token_present = std::env::var(&self.server.token_env)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if !token_present {
            let severity = if self.server.require_auth {
                ConfigSeverity::Error
            } else {
                ConfigSeverity::Warning
            };
            errors.push(ConfigError {
                severity,
                field: "server.token_env".into(),
                message: format!(
                    "{} is unset; requests will be accepted without authentication",
                    self.server.token_env
                ),
            });
        }

        // CORS: warn on a bare wildcard, reject prefix-bypass tricks in the
        // scheme://*.suffix:* form (e.g. "http://evil.com*.example.com" is
        // not a valid pattern to begin with, but a missing "." before the
        // wildcard suffix would let "http://evilexample.com" match
        // "example.com" — require the suffix to start with a dot).
        for (i, origin) in self.server.cors.allowed_origins.iter().enumerate() {
            if origin == "*" {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "server.cors.allowed_origins".into(),
                    message: "wildcard \"*\" allows all origins (not recommended for production)"
                        .into(),
                });
                continue;
            }
            if let Some(star) = origin.find('*') {
                let before = &origin[..star];
                let after = &origin[star + 1..];
                let scheme_ok = before.ends_with("://") || before.is_empty();
                let suffix_ok = after.is_empty() || after.starts_with('.') || after.starts_with(':');
                if !scheme_ok || !suffix_ok {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("server.cors.allowed_origins[{i}]"),
                        message: format!(
                            "\"{origin}\" is not a safe wildcard pattern; wildcards must be the whole host (\"scheme://*\") or a dot-delimited subdomain suffix (\"scheme://*.suffix:*\")"
                        ),
                    });
                }
            }
        }

        // Rate limit: if set, both values must be > 0.
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        // Warn when no LLM provider is configured.
        if self.llm.providers.is_empty() {
            let severity = match self.llm.startup_policy {
                LlmStartupPolicy::RequireOne => ConfigSeverity::Error,
                LlmStartupPolicy::AllowNone => ConfigSeverity::Warning,
            };
            errors.push(ConfigError {
                severity,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        // Track seen provider IDs for duplicate detection.
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: "provider base_url must not be empty".into(),
                });
            }

            if !provider.base_url.is_empty()
                && !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }

            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }

            // Auth completeness: modes that require credentials must have
            // at least one of env, key, or keys.
            let needs_credentials = matches!(provider.auth.mode, AuthMode::ApiKey | AuthMode::QueryParam);
            if needs_credentials {
                let has_env = provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
                let has_key = provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
                let has_keys = !provider.auth.keys.is_empty();
                if !has_env && !has_key && !has_keys {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].auth"),
                        message: format!(
                            "provider \"{}\" uses {:?} auth mode but has no auth.env, auth.key, or auth.keys configured",
                            provider.id, provider.auth.mode
                        ),
                    });
                }
            }
        }

        // ── MCP server validation ─────────────────────────────────────
        let mut seen_mcp_ids: HashSet<&str> = HashSet::new();
        for (i, server) in self.mcp.servers.iter().enumerate() {
            if server.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcp.servers[{i}].id"),
                    message: "server id must not be empty".into(),
                });
            }
            if server.id.contains(':') {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcp.servers[{i}].id"),
                    message: "server id must not contain ':' (used as tool name delimiter)".into(),
                });
            }
            match server.transport {
                McpTransportKind::Stdio if server.command.is_empty() => {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("mcp.servers[{i}].command"),
                        message: "stdio transport requires a non-empty command".into(),
                    });
                }
                McpTransportKind::Http if server.url.is_none() => {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("mcp.servers[{i}].url"),
                        message: "http transport requires a url".into(),
                    });
                }
                _ => {}
            }
            if server.transport == McpTransportKind::Http {
                match server.auth.mode {
                    McpAuthMode::Oauth | McpAuthMode::OauthBrowser | McpAuthMode::ClientCredentials
                        if server.auth.token_url.is_none() =>
                    {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("mcp.servers[{i}].auth.token_url"),
                            message: format!(
                                "{:?} auth mode requires a token_url",
                                server.auth.mode
                            ),
                        });
                    }
                    McpAuthMode::Bearer | McpAuthMode::ApiKey if server.auth.token_env.is_none() => {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("mcp.servers[{i}].auth.token_env"),
                            message: format!("{:?} auth mode requires a token_env", server.auth.mode),
                        });
                    }
                    _ => {}
                }
            }
            if !server.id.is_empty() && !seen_mcp_ids.insert(&server.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcp.servers[{i}].id"),
                    message: format!("duplicate MCP server id \"{}\"", server.id),
                });
            }
            for key in server.env.keys() {
                if matches!(key.as_str(), "LD_PRELOAD" | "LD_LIBRARY_PATH" | "DYLD_INSERT_LIBRARIES") {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("mcp.servers[{i}].env.{key}"),
                        message: format!("overriding {key} is not permitted for security"),
                    });
                }
            }
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 3210,
                host: "127.0.0.1".into(),
                require_auth: false,
                ..ServerConfig::default()
            },
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.openai.com/v1".into(),
                    auth: AuthConfig {
                        mode: AuthMode::ApiKey,
                        env: Some("OPENAI_API_KEY".into()),
                        ..AuthConfig::default()
                    },
                    default_model: None,
                }],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn server_host_empty_is_error() {
        let mut cfg = valid_config();
        cfg.server.host = String::new();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.host").expect("expected server.host error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn missing_token_is_warning_by_default() {
        let mut cfg = valid_config();
        cfg.server.token_env = "SW_TEST_TOKEN_DOES_NOT_EXIST".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.token_env").expect("expected token warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn missing_token_is_error_when_require_auth() {
        let mut cfg = valid_config();
        cfg.server.token_env = "SW_TEST_TOKEN_DOES_NOT_EXIST".into();
        cfg.server.require_auth = true;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.token_env").expect("expected token error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn provider_base_url_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].base_url = "ws://localhost:1234".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers[0].base_url")
            .expect("expected provider base_url error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn provider_api_key_mode_no_credentials_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth = AuthConfig {
            mode: AuthMode::ApiKey,
            env: None,
            key: None,
            keys: vec![],
        };
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers[0].auth").expect("expected auth error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
        assert!(issue.message.contains("no auth.env"));
    }

    #[test]
    fn provider_none_auth_mode_no_credentials_is_ok() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth = AuthConfig {
            mode: AuthMode::None,
            env: None,
            key: None,
            keys: vec![],
        };
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.providers[0].auth").is_none());
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = valid_config();
        let mut second = cfg.llm.providers[0].clone();
        second.auth.env = Some("OPENAI_API_KEY_2".into());
        cfg.llm.providers.push(second);
        let issues = cfg.validate();
        let dup: Vec<_> = issues.iter().filter(|e| e.message.contains("duplicate provider id")).collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_providers_respects_startup_policy() {
        let mut cfg = valid_config();
        cfg.llm.providers.clear();
        cfg.llm.startup_policy = LlmStartupPolicy::AllowNone;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "llm.providers").unwrap().severity,
            ConfigSeverity::Warning
        );

        cfg.llm.startup_policy = LlmStartupPolicy::RequireOne;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "llm.providers").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn cors_subdomain_wildcard_is_ok() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["https://*.example.com".into()];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.cors.allowed_origins[0]").is_none());
    }

    #[test]
    fn cors_prefix_bypass_pattern_is_error() {
        let mut cfg = valid_config();
        // missing the leading "." before the suffix: "evilexample.com" would
        // match this pattern even though it isn't a subdomain of example.com.
        cfg.server.cors.allowed_origins = vec!["https://*example.com".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors.allowed_origins[0]")
            .expect("expected prefix-bypass error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn rate_limit_zero_rps_is_error() {
        let mut cfg = valid_config();
        cfg.server.rate_limit = Some(RateLimitConfig {
            requests_per_second: 0,
            burst_size: 100,
        });
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.rate_limit.requests_per_second")
            .expect("expected rps error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn mcp_server_id_with_colon_is_error() {
        let mut cfg = valid_config();
        cfg.mcp.servers.push(McpServerConfig {
            id: "bad:id".into(),
            command: "npx".into(),
            args: vec![],
            transport: McpTransportKind::Stdio,
            url: None,
            env: Default::default(),
            auth: Default::default(),
        });
        let issues = cfg.validate();
        assert!(find_issue(&issues, "mcp.servers[0].id").is_some());
    }

    #[test]
    fn mcp_http_oauth_without_token_url_is_error() {
        let mut cfg = valid_config();
        cfg.mcp.servers.push(McpServerConfig {
            id: "remote".into(),
            command: String::new(),
            args: vec![],
            transport: McpTransportKind::Http,
            url: Some("https://example.com/mcp".into()),
            env: Default::default(),
            auth: McpAuthConfig {
                mode: McpAuthMode::Oauth,
                ..Default::default()
            },
        });
        let issues = cfg.validate();
        assert!(find_issue(&issues, "mcp.servers[0].auth.token_url").is_some());
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
