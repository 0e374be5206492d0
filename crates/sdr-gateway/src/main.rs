use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

mod app;
mod composer;
mod http;
mod turn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sdr_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > SOLARPRIME_CONFIG env > ~/.solarprime/solarprime.toml
    let config_path = std::env::var("SOLARPRIME_CONFIG").ok();
    let config = sdr_core::config::SolarPrimeConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("config load failed ({}), using defaults", e);
            sdr_core::config::SolarPrimeConfig::default()
        });

    let store = Arc::new(sdr_store::SqliteStore::open(&config.database.path)?);
    let context = sdr_context::ContextManager::new(store.clone(), config.session.clone());
    let sweep_context = context.clone();
    let sweep_store = store.clone();

    let provider: Arc<dyn sdr_agent::provider::LlmProvider> = Arc::new(sdr_agent::AnthropicProvider::new(
        config.providers.anthropic.api_key.clone(),
        Some(config.providers.anthropic.base_url.clone()),
    ));

    let crm: Arc<dyn sdr_agent::tools::crm::CrmClient> = Arc::new(sdr_agent::tools::crm::HttpCrmClient::new(
        config.providers.crm.base_url.clone(),
        config.providers.crm.api_key.clone(),
    ));
    let calendar: Arc<dyn sdr_agent::tools::calendar::CalendarClient> =
        Arc::new(sdr_agent::tools::calendar::HttpCalendarClient::new(
            config.providers.calendar.base_url.clone(),
            config.providers.calendar.api_key.clone(),
        ));
    let media_analyzer: Arc<dyn sdr_agent::tools::media::MediaAnalyzer> = Arc::new(
        sdr_agent::tools::media::LlmMediaAnalyzer::new(provider.clone(), config.agent.model.clone()),
    );

    let channel = Arc::new(sdr_channels::WhatsAppChannel::new(config.whatsapp.clone()));
    let outbound_gateway: Arc<dyn sdr_humanizer::OutboundGateway> = channel.clone();
    let media_gateway: Arc<dyn sdr_humanizer::MediaGateway> = channel.clone();

    let tools: Vec<Box<dyn sdr_agent::tools::Tool>> = vec![
        Box::new(sdr_agent::tools::outbound::SendTextTool::new(outbound_gateway.clone())),
        Box::new(sdr_agent::tools::outbound::SendMediaTool::new(media_gateway.clone())),
        Box::new(sdr_agent::tools::outbound::SendTypingIndicatorTool::new(outbound_gateway.clone())),
        Box::new(sdr_agent::tools::crm::SearchLeadTool::new(crm.clone())),
        Box::new(sdr_agent::tools::crm::CreateLeadTool::new(crm.clone())),
        Box::new(sdr_agent::tools::crm::UpdateLeadTool::new(crm.clone())),
        Box::new(sdr_agent::tools::crm::MoveStageTool::new(crm.clone())),
        Box::new(sdr_agent::tools::crm::AddNoteTool::new(crm.clone())),
        Box::new(sdr_agent::tools::crm::ScheduleActivityTool::new(crm.clone())),
        Box::new(sdr_agent::tools::calendar::CheckAvailabilityTool::new(calendar.clone())),
        Box::new(sdr_agent::tools::calendar::CreateMeetingTool::new(calendar.clone())),
        Box::new(sdr_agent::tools::calendar::UpdateMeetingTool::new(calendar.clone())),
        Box::new(sdr_agent::tools::calendar::CancelMeetingTool::new(calendar.clone())),
        Box::new(sdr_agent::tools::calendar::SendInviteTool::new(calendar.clone())),
        Box::new(sdr_agent::tools::media::AnalyzeImageTool::new(media_analyzer.clone())),
        Box::new(sdr_agent::tools::media::TranscribeAudioTool::new(media_analyzer.clone())),
        Box::new(sdr_agent::tools::media::ExtractDocumentTextTool::new(media_analyzer.clone())),
        Box::new(sdr_agent::tools::persistence::GetLeadTool::new(store.clone())),
        Box::new(sdr_agent::tools::persistence::CreateLeadRecordTool::new(store.clone())),
        Box::new(sdr_agent::tools::persistence::UpdateLeadRecordTool::new(store.clone())),
        Box::new(sdr_agent::tools::persistence::SaveMessageTool::new(store.clone())),
        Box::new(sdr_agent::tools::persistence::UpdateConversationTool::new(store.clone())),
        Box::new(sdr_agent::tools::persistence::ScheduleFollowUpTool::new(store.clone())),
        Box::new(sdr_agent::tools::utility::ValidatePhoneTool),
        Box::new(sdr_agent::tools::utility::FormatCurrencyTool),
    ];

    let humanizer = Arc::new(sdr_humanizer::Humanizer::new(config.humanizer.clone()));

    let state = app::AppState::new(
        config.clone(),
        store.clone(),
        context,
        provider.clone(),
        tools,
        humanizer.clone(),
        channel,
    );

    let followup_composer = Arc::new(composer::LlmFollowUpComposer::new(
        provider,
        config.agent.followup_model.clone(),
    ));
    let followup_engine = Arc::new(sdr_followup::FollowUpEngine::new(
        store,
        humanizer,
        outbound_gateway,
        followup_composer,
        config.followup.clone(),
    ));
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        followup_engine.run(shutdown_rx).await;
    });

    // §4.C session sweep: ends stale sessions and queues a first-touch
    // reminder for every lead whose session just went abandoned.
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            for phone in sweep_context.cleanup_sweep().await {
                let lead = match sweep_store.get_lead_by_phone(&phone) {
                    Ok(Some(lead)) => lead,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(phone = %phone, error = %e, "sweep: failed to load lead");
                        continue;
                    }
                };
                if let Err(e) = sdr_followup::schedule_first_touch(&sweep_store, &lead.lead_id) {
                    tracing::warn!(phone = %phone, error = %e, "sweep: failed to schedule first-touch follow-up");
                }
            }
        }
    });

    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("SDR gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
