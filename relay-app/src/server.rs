//! Relay server and CLI command bodies.

use crate::config::{RelayConfig, presence};
use crate::context::ContextBuffer;
use crate::persona::{PersonaOrigin, PersonaSource};
use crate::responder::ResponseGenerator;
use crate::routes;
use crate::wake::AddressDetector;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use relay_line::{LineClient, ReplySender, WebhookParser};
use relay_llm::{ChatBackend, LlmClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Everything a webhook delivery needs. Shared by all in-flight requests.
pub struct RelayState {
    pub parser: WebhookParser,
    pub detector: AddressDetector,
    pub context: Arc<ContextBuffer>,
    pub responder: ResponseGenerator,
    pub replier: Arc<dyn ReplySender>,
}

impl RelayState {
    fn from_config(cfg: &RelayConfig) -> Result<Self> {
        cfg.require_credentials()?;
        let context = Arc::new(ContextBuffer::new(cfg.persona.context_capacity));
        let replier = LineClient::new(
            &cfg.line.channel_access_token,
            cfg.line.api_base_url.as_deref(),
            cfg.line_timeout(),
        )?;
        Ok(Self {
            parser: WebhookParser::new(&cfg.line.channel_secret),
            detector: detector(cfg),
            responder: responder(cfg, context.clone()),
            context,
            replier: Arc::new(replier),
        })
    }
}

fn detector(cfg: &RelayConfig) -> AddressDetector {
    AddressDetector::new(&cfg.persona.wake_word, &cfg.persona.greeting_payload)
}

fn responder(cfg: &RelayConfig, context: Arc<ContextBuffer>) -> ResponseGenerator {
    let backend: Arc<dyn ChatBackend> = Arc::new(LlmClient::new(
        &cfg.llm.api_key,
        &cfg.llm.model,
        cfg.llm.base_url.as_deref(),
        cfg.llm_timeout(),
    ));
    ResponseGenerator::new(
        backend,
        context,
        PersonaSource::new(&cfg.persona.prompt_path),
        cfg.llm.completion_params(),
        cfg.persona.max_reply_chars,
    )
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    let source = PersonaSource::new(&cfg.persona.prompt_path);
    let persona = source.load().await;
    tracing::info!(
        bind_addr = %cfg.server.bind_addr,
        webhook_path = %cfg.server.webhook_path,
        model = %cfg.llm.model,
        llm_base_url = ?cfg.llm.base_url,
        line_channel_access_token = presence(&cfg.line.channel_access_token),
        line_channel_secret = presence(&cfg.line.channel_secret),
        openai_api_key = presence(&cfg.llm.api_key),
        persona_path = %source.path().display(),
        persona_origin = ?persona.origin,
        wake_word = %cfg.persona.wake_word,
        context_capacity = cfg.persona.context_capacity,
        "config loaded"
    );
    if persona.origin != PersonaOrigin::File {
        tracing::warn!("persona file unavailable; replies will use the built-in persona");
    }
    cfg.require_credentials()?;
    tracing::info!("config ok");
    Ok(())
}

/// Run one message through detection and generation without LINE.
pub async fn ask(config_path: Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    if cfg.llm.api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("missing credentials: OPENAI_API_KEY"));
    }
    let detection = detector(&cfg).detect(message);
    if !detection.addressed {
        println!(
            "(not addressed: start the message with {:?} to get a reply)",
            cfg.persona.wake_word
        );
        return Ok(());
    }
    let context = Arc::new(ContextBuffer::new(cfg.persona.context_capacity));
    let reply = responder(&cfg, context).generate(&detection.payload).await;
    println!("{reply}");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    let addr = cfg.bind_addr()?;
    tracing::info!(
        bind_addr = %addr,
        webhook_path = %cfg.server.webhook_path,
        model = %cfg.llm.model,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        llm_timeout_seconds = cfg.llm.timeout_seconds,
        line_timeout_seconds = cfg.line.timeout_seconds,
        persona_path = %cfg.persona.prompt_path.display(),
        "server configuration loaded"
    );
    let state = Arc::new(RelayState::from_config(&cfg)?);
    tracing::debug!(
        context_capacity = state.context.capacity(),
        "relay state ready"
    );
    let listener = bind_listener(addr).await?;

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router(&cfg.server.webhook_path)
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            cfg.http_timeout(),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "ronna-relay serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

async fn bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind failed for {addr}: {e}"))
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}
