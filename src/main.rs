use std::sync::Arc;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use approval_assist::approval::{ApprovalWorkflow, LlmClassifier, LlmExtractor};
use approval_assist::config::{AUTO_APPROVAL_CUTOFF, ServerConfig};
use approval_assist::gateway::{Gateway, approval_routes, cors_layer};
use approval_assist::llm::{LlmConfig, LlmHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    // A bad LLM configuration does not stop the server; runs end in Error.
    let llm = LlmHandle::from_config(LlmConfig::from_env());

    eprintln!("Approval Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind_addr());
    eprintln!("   Auto-approval cutoff: {}", AUTO_APPROVAL_CUTOFF);
    eprintln!("   LLM: {:?}", llm);
    eprintln!("   CORS origins: {}", config.cors_origins.join(", "));
    match config.workflow_timeout {
        Some(t) => eprintln!("   Workflow timeout: {}s\n", t.as_secs()),
        None => eprintln!("   Workflow timeout: none\n"),
    }

    let workflow = ApprovalWorkflow::new(
        Arc::new(LlmClassifier::new(llm.clone())),
        Arc::new(LlmExtractor::new(llm.clone())),
    );
    let gateway = Arc::new(Gateway::new(workflow).with_timeout(config.workflow_timeout));

    let app = approval_routes(gateway, llm).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.cors_origins)),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), "Approval server started");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
