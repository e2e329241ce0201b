pub mod accounts;
pub mod anthropic;
pub mod anthropic_models;
pub mod bedrock;
pub mod capability;
pub mod cri;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod secrets;
pub mod types;

pub use accounts::{AccountConfig, AccountRotation, SharedAccountRotation};
pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use capability::{capability_for, CacheLayer, ModelCapability, CAPABILITY_TABLE};
pub use error::{LlmError, LlmResult};
pub use provider::LlmProvider;
pub use secrets::SsmSecretReader;
pub use types::*;

use rand::Rng;
use std::sync::Arc;
use swe_core::SessionKey;
use tokio_util::sync::CancellationToken;

/// Outcome of one `converse()` call: the neutral response plus the
/// "ultra" reasoning budget, present only when the non-default budget was
/// applied (spec.md §4.D step 7).
pub struct ConverseOutcome {
    pub response: types::ConverseResponse,
    pub thinking_budget: Option<u32>,
    /// The neutral model id actually selected for this call (spec.md §4.D
    /// step 1), for cost-ledger attribution — distinct from any CRI-prefixed
    /// wire id sent to the provider.
    pub model_id: String,
}

/// Top-level LLM Client operation (spec.md §4.D): picks a candidate model,
/// resolves its capability and CRI profile, normalizes the request, and
/// dispatches to a provider, rotating accounts on throttling.
///
/// 1. Pick one model uniformly at random from `candidateModels`; look up its
///    capability entry (unknown models are rejected).
/// 2. Resolve the CRI profile (Bedrock provider only; no-op otherwise); if
///    the model supports it, prepend its tag to the model id.
/// 3. Normalize the request against the capability entry.
/// 4. Dispatch to the configured provider.
/// 5. On `Throttled`, rotate to the next account and rethrow — this call
///    makes exactly one provider attempt; retrying belongs to the Agent
///    Turn Loop's outer wrapper (spec.md §4.F "Retry outer loop (in F, not
///    D)"), not this client.
/// 6. On any other error, propagate it unchanged.
/// 7. On success, return the response and the thinking budget, the latter
///    only when the non-default ("ultra") budget was used.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    rotation: Option<SharedAccountRotation>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            rotation: None,
        }
    }

    pub fn with_account_rotation(mut self, rotation: SharedAccountRotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub async fn converse(
        &self,
        _worker_id: &SessionKey,
        candidate_models: &[String],
        mut request: types::ConverseRequest,
        max_tokens_retry_count: u32,
        cancel: Option<&CancellationToken>,
    ) -> LlmResult<ConverseOutcome> {
        let model_id = select_model(candidate_models)
            .ok_or_else(|| LlmError::Provider("no candidate models given".into()))?;
        let capability = capability::capability_for(model_id)
            .ok_or_else(|| LlmError::UnsupportedModel(model_id.to_string()))?;

        let selected_model_id = model_id.to_string();
        request.model_id = selected_model_id.clone();
        if self.provider.name() == "bedrock" {
            let profile = cri::resolve_profile();
            if capability.supported_cri_profiles.contains(&profile.as_str()) {
                request.model_id = cri::apply(&profile, &request.model_id);
            }
        }

        let thinking_budget = normalize::normalize(&mut request, capability, max_tokens_retry_count);

        let account_index = self.rotation.as_ref().map(|r| r.current_index());
        match self.provider.converse(&request, cancel).await {
            Ok(mut response) => {
                response.served_by_account = account_index;
                Ok(ConverseOutcome {
                    response,
                    thinking_budget,
                    model_id: selected_model_id.clone(),
                })
            }
            Err(LlmError::Throttled(msg)) => {
                if let Some(rotation) = &self.rotation {
                    let next = rotation.advance();
                    tracing::warn!(account_index, next, "throttled; rotated account");
                }
                Err(LlmError::Throttled(msg))
            }
            Err(other) => Err(other),
        }
    }
}

/// Uniformly at random picks one model id from the candidates (spec.md §4.D
/// step 1).
fn select_model(candidate_models: &[String]) -> Option<&str> {
    if candidate_models.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..candidate_models.len());
    Some(candidate_models[idx].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConverseResponse, InferenceConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use swe_core::{ContentBlock, Usage};

    #[test]
    fn select_model_picks_from_candidates() {
        let candidates = vec!["a".to_string(), "b".to_string()];
        let picked = select_model(&candidates).unwrap();
        assert!(candidates.iter().any(|c| c == picked));
    }

    #[test]
    fn select_model_empty_is_none() {
        assert!(select_model(&[]).is_none());
    }

    struct FakeProvider {
        calls: AtomicU32,
        throttle_first_n: u32,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn converse(
            &self,
            _request: &types::ConverseRequest,
            _cancel: Option<&CancellationToken>,
        ) -> LlmResult<ConverseResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.throttle_first_n {
                return Err(LlmError::Throttled("slow down".into()));
            }
            Ok(ConverseResponse {
                content: vec![ContentBlock::text("ok")],
                stop_reason: types::StopReason::EndTurn,
                usage: Usage::default(),
                served_by_account: None,
            })
        }
    }

    fn request() -> types::ConverseRequest {
        types::ConverseRequest {
            model_id: String::new(),
            messages: vec![types::LlmMessage::user(vec![ContentBlock::text("hi")])],
            system: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            inference: InferenceConfig::default(),
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn success_does_not_rotate_account() {
        let rotation = Arc::new(AccountRotation::new(
            vec![
                AccountConfig { role_arn: "arn:aws:iam::1:role/x".into(), external_id: None },
                AccountConfig { role_arn: "arn:aws:iam::2:role/x".into(), external_id: None },
            ],
            dummy_sts_client(),
        ));
        let provider = Arc::new(FakeProvider { calls: AtomicU32::new(0), throttle_first_n: 0 });
        let client = LlmClient::new(provider).with_account_rotation(rotation.clone());

        let worker = SessionKey::new("w1");
        let outcome = client
            .converse(&worker, &["claude-sonnet-4".to_string()], request(), 0, None)
            .await
            .unwrap();
        assert_eq!(outcome.response.stop_reason, types::StopReason::EndTurn);
        assert_eq!(rotation.current_index(), 0);
    }

    #[tokio::test]
    async fn throttle_advances_index_exactly_once_and_rethrows() {
        let rotation = Arc::new(AccountRotation::new(
            vec![
                AccountConfig { role_arn: "arn:aws:iam::1:role/x".into(), external_id: None },
                AccountConfig { role_arn: "arn:aws:iam::2:role/x".into(), external_id: None },
            ],
            dummy_sts_client(),
        ));
        let provider = Arc::new(FakeProvider { calls: AtomicU32::new(0), throttle_first_n: 1 });
        let client = LlmClient::new(provider).with_account_rotation(rotation.clone());

        let worker = SessionKey::new("w1");
        // spec.md §4.D step 5 / §8 P8: a single converse() call makes one
        // provider attempt and rotates-then-rethrows on throttle; it does not
        // retry internally. Retrying is the Agent Turn Loop's job.
        let err = client
            .converse(&worker, &["claude-sonnet-4".to_string()], request(), 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Throttled(_)));
        assert_eq!(rotation.current_index(), 1);

        // The caller's retry (as the Agent Turn Loop does) then succeeds
        // against the rotated account.
        let outcome = client
            .converse(&worker, &["claude-sonnet-4".to_string()], request(), 0, None)
            .await
            .unwrap();
        assert_eq!(outcome.response.stop_reason, types::StopReason::EndTurn);
        assert_eq!(rotation.current_index(), 1);
    }

    fn dummy_sts_client() -> aws_sdk_sts::Client {
        let config = aws_sdk_sts::Config::builder()
            .behavior_version(aws_sdk_sts::config::BehaviorVersion::latest())
            .region(aws_sdk_sts::config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::provider::SharedCredentialsProvider::new(
                aws_credential_types::Credentials::for_tests(),
            ))
            .build();
        aws_sdk_sts::Client::from_conf(config)
    }
}
