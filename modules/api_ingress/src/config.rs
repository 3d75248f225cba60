use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_ENV: &str = "API_TOKEN";

/// API ingress configuration, read from `modules.api_ingress`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiIngressConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub enable_docs: bool,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ApiIngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_docs: false,
            cors_enabled: false,
            auth: AuthConfig::default(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8087".to_string()
}

/// Where the reference token comes from. An explicit `token` wins over `token_env`.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            token: None,
        }
    }
}

// Keep the token out of debug output and logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_env", &self.token_env)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

impl AuthConfig {
    /// Resolve the reference token once: explicit value, else the named env var.
    pub fn resolve_token(&self) -> anyhow::Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        std::env::var(&self.token_env).map_err(|e| {
            anyhow::anyhow!(
                "reference token is not configured: env var '{}' ({e})",
                self.token_env
            )
        })
    }
}
