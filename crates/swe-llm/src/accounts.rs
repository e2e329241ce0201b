//! Multi-account rotation (spec.md §4.D). A process-wide round-robin index
//! selects which configured account services the next call; on `Throttled`
//! the caller advances the index and retries against the next account.

use aws_credential_types::Credentials;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AccountConfig {
    pub role_arn: String,
    pub external_id: Option<String>,
}

pub struct AccountRotation {
    accounts: Vec<AccountConfig>,
    index: AtomicUsize,
    sts: aws_sdk_sts::Client,
}

impl AccountRotation {
    pub fn new(accounts: Vec<AccountConfig>, sts: aws_sdk_sts::Client) -> Self {
        Self {
            accounts,
            index: AtomicUsize::new(0),
            sts,
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Index of the account the next call should use, without advancing it.
    pub fn current_index(&self) -> usize {
        if self.accounts.is_empty() {
            0
        } else {
            self.index.load(Ordering::Relaxed) % self.accounts.len()
        }
    }

    /// Advances the round-robin index, wrapping back to the first account.
    pub fn advance(&self) -> usize {
        if self.accounts.is_empty() {
            return 0;
        }
        let next = (self.index.fetch_add(1, Ordering::Relaxed) + 1) % self.accounts.len();
        next
    }

    /// Assumes the role configured for `index`, returning short-lived
    /// credentials the LLM provider client can be built or refreshed with.
    pub async fn assume_role(&self, index: usize) -> crate::error::LlmResult<Credentials> {
        let account = self
            .accounts
            .get(index)
            .ok_or_else(|| crate::error::LlmError::Provider(format!("no account at index {index}")))?;

        let mut request = self
            .sts
            .assume_role()
            .role_arn(&account.role_arn)
            .role_session_name("swe-agent-turn-loop");
        if let Some(external_id) = &account.external_id {
            request = request.external_id(external_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| crate::error::LlmError::AuthFailed(e.to_string()))?;

        let creds = response
            .credentials()
            .ok_or_else(|| crate::error::LlmError::AuthFailed("assume_role returned no credentials".into()))?;

        Ok(Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_string()),
            creds
                .expiration()
                .and_then(|e| std::time::SystemTime::try_from(*e).ok()),
            "swe-account-rotation",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::SharedCredentialsProvider;

    fn fake_sts_client() -> aws_sdk_sts::Client {
        let config = aws_sdk_sts::Config::builder()
            .behavior_version(aws_sdk_sts::config::BehaviorVersion::latest())
            .region(aws_sdk_sts::config::Region::new("us-east-1"))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::for_tests()))
            .build();
        aws_sdk_sts::Client::from_conf(config)
    }

    fn rotation(n: usize) -> AccountRotation {
        let accounts = (0..n)
            .map(|i| AccountConfig {
                role_arn: format!("arn:aws:iam::{i}:role/swe-agent"),
                external_id: None,
            })
            .collect();
        AccountRotation::new(accounts, fake_sts_client())
    }

    #[test]
    fn advance_wraps_around_account_count() {
        let r = rotation(3);
        assert_eq!(r.current_index(), 0);
        assert_eq!(r.advance(), 1);
        assert_eq!(r.current_index(), 1);
        assert_eq!(r.advance(), 2);
        assert_eq!(r.advance(), 0);
        assert_eq!(r.current_index(), 0);
    }

    #[test]
    fn single_account_always_rotates_to_itself() {
        let r = rotation(1);
        assert_eq!(r.advance(), 0);
        assert_eq!(r.current_index(), 0);
    }

    #[test]
    fn empty_accounts_index_is_always_zero() {
        let r = rotation(0);
        assert_eq!(r.current_index(), 0);
        assert_eq!(r.advance(), 0);
    }
}

pub type SharedAccountRotation = Arc<AccountRotation>;
