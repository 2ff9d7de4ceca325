use crate::bot::ChatHandler;
use crate::config::BotSettings;
use crate::discord::gateway::DEFAULT_INTENTS;
use crate::discord::{DiscordHttp, Gateway, GatewayEvent};
use anyhow::{Context, Result};
use kaz_bot_core::completion::{CompletionInvoker, CredentialPool, InvokerOptions};
use kaz_bot_core::conversation::BotIdentity;
use kaz_bot_core::llm::providers::GroqProviderFactory;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EVENT_QUEUE_SIZE: usize = 256;

/// Run the Discord transport runtime until Ctrl+C or a fatal gateway error.
///
/// # Errors
///
/// Returns an error if the credential pool or REST client cannot be built, or
/// when the gateway stops for good.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let invoker = Arc::new(init_invoker(&settings)?);
    let http = Arc::new(
        DiscordHttp::new(&settings.discord.discord_token)
            .context("failed to build Discord REST client")?,
    );
    let system_context = settings.core.system_context().unwrap_or_default().to_string();
    let handler = Arc::new(ChatHandler::new(
        http.clone(),
        http,
        invoker,
        Arc::clone(&settings.discord),
        system_context,
    ));
    info!(
        mention_required = handler.mention_mode().is_required(),
        history_limit = settings.discord.history_limit(),
        "Message handler initialized."
    );

    let cancel = CancellationToken::new();
    spawn_ctrlc_handler(cancel.clone());

    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let gateway = Gateway::new(settings.discord.discord_token.clone(), DEFAULT_INTENTS);
    let gateway_task = tokio::spawn(gateway.run(tx, cancel.clone()));

    info!("Bot is running...");

    let mut identity: Option<Arc<BotIdentity>> = None;
    while let Some(event) = rx.recv().await {
        match event {
            GatewayEvent::Ready(user) => {
                info!("Logged in as {} ({})", user.username, user.id);
                identity = Some(Arc::new(BotIdentity::new(user.id)));
            }
            GatewayEvent::MessageCreate(msg) => {
                let Some(bot) = identity.clone() else {
                    warn!("Message received before READY, skipping");
                    continue;
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = handler.handle_message(&bot, msg).await {
                        error!("Failed to handle message: {e:#}");
                    }
                });
            }
        }
    }

    cancel.cancel();
    gateway_task
        .await
        .context("gateway task panicked")?
        .context("gateway stopped")?;
    info!("Bot stopped.");
    Ok(())
}

fn init_invoker(settings: &BotSettings) -> Result<CompletionInvoker> {
    let keys = settings.core.groq_api_keys();
    let pool = CredentialPool::new(keys).context("no Groq API keys configured")?;
    info!("Credential pool initialized with {} key(s).", pool.len());

    let options = InvokerOptions::from_settings(&settings.core);
    info!(
        model = %options.model_id,
        temperature = options.temperature,
        timeout_secs = options.timeout.as_secs(),
        "LLM invoker initialized."
    );
    Ok(CompletionInvoker::new(
        Arc::new(pool),
        Arc::new(GroqProviderFactory::new()),
        options,
    ))
}

fn spawn_ctrlc_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received.");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
        }
    });
}
