use dotenvy::dotenv;
use kaz_bot_core::config::CoreSettings;
use kaz_bot_transport_discord::config::{BotSettings, DiscordSettings};
use kaz_bot_transport_discord::runner::run_bot;
use regex::Regex;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "kaz_bot=info,kaz_bot_core=info,kaz_bot_transport_discord=info,\
hyper=warn,h2=error,reqwest=warn,rustls=warn,tungstenite=warn,tokio_tungstenite=warn,async_openai=warn";

/// Secret patterns and their replacements, applied in order
struct RedactionPatterns(Vec<(Regex, &'static str)>);

impl RedactionPatterns {
    fn new() -> Result<Self, regex::Error> {
        let table = [
            (r"(Bot|Bearer) [A-Za-z0-9_.\-]{20,}", "$1 [MASKED]"),
            (
                r"[A-Za-z0-9_-]{23,28}\.[A-Za-z0-9_-]{6,7}\.[A-Za-z0-9_-]{27,40}",
                "[DISCORD_TOKEN]",
            ),
            (r"gsk_[A-Za-z0-9]{8,}", "[GROQ_API_KEY]"),
            (
                r"(GROQ_API_KEY[0-9]*|GROQ_API_KEYS|DISCORD_TOKEN)=[^\s&]+",
                "$1=[MASKED]",
            ),
        ];
        table
            .into_iter()
            .map(|(pattern, replacement)| -> Result<_, regex::Error> {
                Ok((Regex::new(pattern)?, replacement))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    fn redact(&self, input: &str) -> String {
        self.0
            .iter()
            .fold(input.to_string(), |text, (pattern, replacement)| {
                pattern.replace_all(&text, *replacement).into_owned()
            })
    }
}

/// Writes each log line through [`RedactionPatterns`]
struct RedactingWriter<W> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // before logging, so nothing is written unredacted
    let patterns = Arc::new(RedactionPatterns::new().inspect_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
    })?);
    init_logging(patterns);

    info!("Starting KAZ Discord bot...");

    let settings = Arc::new(BotSettings::new(
        load_or_exit("core", CoreSettings::new),
        load_or_exit("discord", DiscordSettings::new),
    ));
    info!("Configuration loaded successfully.");

    if let Err(e) = run_bot(settings).await {
        error!("Bot stopped with error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let debug_mode = std::env::var("DEBUG_MODE").is_ok_and(|v| v == "true" || v == "1");
    let default_filter = if debug_mode { "debug" } else { DEFAULT_LOG_FILTER };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let make_writer = move || RedactingWriter {
        inner: io::stderr(),
        patterns: Arc::clone(&patterns),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn load_or_exit<T, E: Display>(section: &str, load: impl FnOnce() -> Result<T, E>) -> T {
    load().unwrap_or_else(|e| {
        error!("Failed to load {section} configuration: {e}");
        std::process::exit(1);
    })
}
