//! Gateway process entry point: bootstraps config, storage, the LLM client,
//! and the Agent Turn Loop, then exposes the two triggers (spec.md §6) over
//! a small axum HTTP surface. The minimal ingress needed to exercise the
//! core; the real chat-app ingress, auth, and web UI are out of scope
//! (spec.md §1).

mod bus;
mod config;
mod routes;

use config::{Config, LlmProviderKind};
use std::net::SocketAddr;
use std::sync::Arc;
use swe_agent::{AgentTurnLoop, NoopMcpDispatcher, ToolRegistry, TurnLoopConfig};
use swe_llm::{AnthropicProvider, BedrockProvider, LlmClient, LlmProvider};
use swe_store::{CostLedger, DynamoStore, KvStore, MemoryStore, MessageStore, MetadataStore, Preferences, SessionStore};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match config.llm_provider {
        LlmProviderKind::Bedrock => Ok(Arc::new(BedrockProvider::from_env().await)),
        LlmProviderKind::Anthropic => {
            let api_key = if let Some(key) = &config.anthropic_api_key {
                key.clone()
            } else if let Some(param) = &config.anthropic_api_key_parameter_name {
                let aws_cfg = aws_config::load_from_env().await;
                let reader = swe_llm::SsmSecretReader::new(aws_sdk_ssm::Client::new(&aws_cfg));
                swe_core::SecretReader::get(&reader, param).await?
            } else {
                anyhow::bail!(
                    "ANTHROPIC_API_KEY or ANTHROPIC_API_KEY_PARAMETER_NAME must be set for LLM_PROVIDER=anthropic"
                );
            };
            Ok(Arc::new(AnthropicProvider::new(api_key)))
        }
    }
}

async fn build_kv_store(config: &Config) -> Arc<dyn KvStore> {
    if aws_config::load_from_env().await.region().is_some() {
        Arc::new(DynamoStore::from_env(config.table_name.clone()).await)
    } else {
        tracing::warn!("no AWS region configured; falling back to an in-memory store");
        Arc::new(MemoryStore::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env();
    tracing::info!(provider = ?config.llm_provider, table = %config.table_name, "starting gateway");

    let kv = build_kv_store(&config).await;
    let messages = Arc::new(MessageStore::new(kv.clone()));
    let sessions = Arc::new(SessionStore::new(kv.clone()));
    let ledger = Arc::new(CostLedger::new(kv.clone()));
    let metadata = Arc::new(MetadataStore::new(kv.clone()));

    let preferences = match std::env::var("PREFERENCES_FILE") {
        Ok(path) => Preferences::load(&path).await?,
        Err(_) => Preferences::default(),
    };

    let provider = build_provider(&config).await?;
    let mut llm_client = LlmClient::new(provider);
    if !config.bedrock_aws_accounts.is_empty() && config.llm_provider == LlmProviderKind::Bedrock {
        let aws_cfg = aws_config::load_from_env().await;
        let sts = aws_sdk_sts::Client::new(&aws_cfg);
        let accounts = config
            .bedrock_aws_accounts
            .iter()
            .map(|account_id| swe_llm::AccountConfig {
                role_arn: format!(
                    "arn:aws:iam::{account_id}:role/{}",
                    config.bedrock_aws_role_name
                ),
                external_id: None,
            })
            .collect();
        llm_client = llm_client
            .with_account_rotation(Arc::new(swe_llm::AccountRotation::new(accounts, sts)));
    }
    let llm = Arc::new(llm_client);

    let tools = Arc::new(ToolRegistry::with_required_tools());
    let mcp = Arc::new(NoopMcpDispatcher);
    let event_bus = Arc::new(bus::FanOutEventBus::new(1024, config.event_http_endpoint.clone()));

    let turn_loop = Arc::new(AgentTurnLoop::new(
        messages.clone(),
        sessions.clone(),
        ledger,
        metadata,
        preferences,
        llm,
        tools,
        mcp,
        event_bus,
        TurnLoopConfig::default(),
    ));

    let state = Arc::new(routes::AppState {
        turn_loop,
        sessions,
        messages,
        started_at: std::time::Instant::now(),
    });

    let app = routes::router(state);
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
