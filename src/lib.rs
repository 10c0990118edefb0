pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod http;
pub mod llm;
pub mod notify;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod trace;

use agent::{ChatConfig, Chatbot, ToolRegistry};
use anyhow::Result;
use cli::{AppState, CliArgs, run_repl};
use config::AppConfig;
use context::IdentityContext;
use http::{HttpClient, HttpDebugConfig};
use llm::openai::OpenAiCompatProvider;
use notify::PushoverNotifier;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use trace::SessionTrace;

/// Diagnostics go to stderr so they never interleave with the chat on stdout.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load_with_path(args.config.as_deref())?;
    if args.no_evaluate {
        config.evaluate = false;
    }
    tracing::debug!(
        path = %config.config_path.display(),
        explicit = config.config_is_explicit,
        "configuration loaded"
    );

    let identity = Arc::new(IdentityContext::load(
        &config.persona_name,
        &config.biography_path,
        &config.resume_path,
    )?);

    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()?;
    let http = HttpClient::new(client, HttpDebugConfig::from_verbose(args.verbose))
        .with_trace(trace.clone());

    let provider = OpenAiCompatProvider::new(
        http.clone(),
        config.llm_api_key.clone(),
        config.llm_base_url.clone(),
    );
    let notifier = PushoverNotifier::new(
        http,
        config.pushover_url.clone(),
        config.pushover_token.clone(),
        config.pushover_user.clone(),
    );
    if config.llm_api_key.is_none() {
        tracing::warn!("no LLM API key configured; requests will likely be rejected");
    }

    let chatbot = Chatbot::new(
        provider,
        identity,
        ToolRegistry::with_contact_tools(Arc::new(notifier)),
        ChatConfig::from(&config),
    );
    let mut app_state = AppState::new(session_id, chatbot, trace);

    run_repl(&mut app_state).await
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
