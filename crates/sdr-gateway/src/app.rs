use std::sync::Arc;

use axum::{routing::post, Router};
use sdr_agent::provider::LlmProvider;
use sdr_agent::tools::Tool;
use sdr_buffer::MessageBuffer;
use sdr_channels::WhatsAppChannel;
use sdr_context::ContextManager;
use sdr_core::config::SolarPrimeConfig;
use sdr_humanizer::Humanizer;
use sdr_store::SqliteStore;

use crate::turn::TurnHandler;

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: SolarPrimeConfig,
    pub store: Arc<SqliteStore>,
    pub buffer: Arc<MessageBuffer<TurnHandler>>,
}

impl AppState {
    pub fn new(
        config: SolarPrimeConfig,
        store: Arc<SqliteStore>,
        context: Arc<ContextManager>,
        provider: Arc<dyn LlmProvider>,
        tools: Vec<Box<dyn Tool>>,
        humanizer: Arc<Humanizer>,
        channel: Arc<WhatsAppChannel>,
    ) -> Arc<Self> {
        let handler = Arc::new(TurnHandler::new(
            store.clone(),
            context,
            provider,
            tools,
            humanizer,
            channel,
            config.agent.clone(),
        ));
        let buffer = MessageBuffer::new((&config.buffer).into(), handler);

        Arc::new(Self {
            config,
            store,
            buffer,
        })
    }
}

/// Assemble the full Axum router: just liveness and the one inbound channel.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route("/webhooks/whatsapp", post(crate::http::webhooks::webhook_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
