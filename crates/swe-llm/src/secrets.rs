//! Production `SecretReader` (spec.md §6): resolves a named parameter
//! against AWS SSM Parameter Store, decrypting `SecureString` values and
//! caching the result for the process lifetime so repeated lookups (e.g.
//! once per account rotation) don't re-hit SSM.

use async_trait::async_trait;
use dashmap::DashMap;
use swe_core::{Error, Result, SecretReader};

pub struct SsmSecretReader {
    client: aws_sdk_ssm::Client,
    cache: DashMap<String, String>,
}

impl SsmSecretReader {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl SecretReader for SsmSecretReader {
    async fn get(&self, parameter_name: &str) -> Result<String> {
        if let Some(cached) = self.cache.get(parameter_name) {
            return Ok(cached.clone());
        }

        let response = self
            .client
            .get_parameter()
            .name(parameter_name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| Error::AuthFailed(e.to_string()))?;

        let value = response
            .parameter()
            .and_then(|p| p.value())
            .ok_or_else(|| Error::AuthFailed(format!("parameter {parameter_name} has no value")))?
            .to_string();

        self.cache.insert(parameter_name.to_string(), value.clone());
        Ok(value)
    }
}
