//! Secret reader seam (spec.md §6 "Secret reader"): `get(name) -> string`,
//! used for the Anthropic API key, Slack bot token, and GitHub credentials.
//! Implementations may cache results for the process lifetime.

use async_trait::async_trait;

#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn get(&self, parameter_name: &str) -> crate::error::Result<String>;
}

/// Reads secrets straight from the process environment, treating
/// `parameter_name` as the variable name. The natural local/dev
/// implementation; production uses an SSM-backed reader instead
/// (`swe_llm::secrets::SsmSecretReader`).
pub struct EnvSecretReader;

#[async_trait]
impl SecretReader for EnvSecretReader {
    async fn get(&self, parameter_name: &str) -> crate::error::Result<String> {
        std::env::var(parameter_name)
            .map_err(|_| crate::error::Error::AuthFailed(format!("{parameter_name} not set")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_from_environment() {
        std::env::set_var("SWE_TEST_SECRET_READER", "shh");
        let reader = EnvSecretReader;
        let value = reader.get("SWE_TEST_SECRET_READER").await.unwrap();
        assert_eq!(value, "shh");
        std::env::remove_var("SWE_TEST_SECRET_READER");
    }

    #[tokio::test]
    async fn missing_variable_is_auth_failed() {
        let reader = EnvSecretReader;
        let err = reader.get("SWE_TEST_SECRET_READER_MISSING").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::AuthFailed(_)));
    }
}
