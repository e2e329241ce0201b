//! Environment-driven configuration (spec.md §6 "Configuration").

use std::env;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProviderKind {
    Bedrock,
    Anthropic,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub llm_provider: LlmProviderKind,
    pub anthropic_api_key: Option<String>,
    pub anthropic_api_key_parameter_name: Option<String>,
    pub bedrock_aws_accounts: Vec<String>,
    pub bedrock_aws_role_name: String,
    pub bedrock_cri_region_override: Option<String>,
    pub table_name: String,
    pub event_http_endpoint: Option<String>,
    pub bind_addr: String,
    pub port: u16,
}

const DEFAULT_ROLE_NAME: &str = "bedrock-remote-swe-role";

impl Config {
    /// Reads every recognized variable from spec.md §6's configuration
    /// table, falling back to the documented defaults.
    pub fn from_env() -> Self {
        let llm_provider = match env::var("LLM_PROVIDER").ok().as_deref() {
            Some("anthropic") => LlmProviderKind::Anthropic,
            _ => LlmProviderKind::Bedrock,
        };

        let bedrock_aws_accounts = env::var("BEDROCK_AWS_ACCOUNTS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            llm_provider,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_api_key_parameter_name: env::var("ANTHROPIC_API_KEY_PARAMETER_NAME").ok(),
            bedrock_aws_accounts,
            bedrock_aws_role_name: env::var("BEDROCK_AWS_ROLE_NAME")
                .unwrap_or_else(|_| DEFAULT_ROLE_NAME.to_string()),
            bedrock_cri_region_override: env::var("BEDROCK_CRI_REGION_OVERRIDE").ok(),
            table_name: env::var("TABLE_NAME").unwrap_or_else(|_| "swe-agent".to_string()),
            event_http_endpoint: env::var("EVENT_HTTP_ENDPOINT").ok(),
            bind_addr: env::var("GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_bedrock_provider() {
        env::remove_var("LLM_PROVIDER");
        let config = Config::from_env();
        assert_eq!(config.llm_provider, LlmProviderKind::Bedrock);
    }

    #[test]
    fn parses_comma_separated_accounts() {
        env::set_var("BEDROCK_AWS_ACCOUNTS", "111111111111, 222222222222");
        let config = Config::from_env();
        assert_eq!(
            config.bedrock_aws_accounts,
            vec!["111111111111".to_string(), "222222222222".to_string()]
        );
        env::remove_var("BEDROCK_AWS_ACCOUNTS");
    }
}
