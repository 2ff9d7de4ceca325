use async_trait::async_trait;
use kaz_bot_core::completion::{CompletionInvoker, CredentialPool, InvokerOptions};
use kaz_bot_core::config::DEFAULT_FALLBACK_REPLY;
use kaz_bot_core::conversation::{BotIdentity, ConversationTurn, RawHistoryEntry};
use kaz_bot_core::llm::{LlmError, LlmProvider, ProviderFactory};
use kaz_bot_transport_discord::bot::messaging::DISCORD_MESSAGE_LIMIT;
use kaz_bot_transport_discord::bot::{ChannelHistory, ChannelMessenger, ChatHandler, Outcome};
use kaz_bot_transport_discord::config::DiscordSettings;
use kaz_bot_transport_discord::discord::{DiscordError, DiscordMessage, DiscordUser};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const BOT_ID: &str = "42";
const CHANNEL: &str = "900";

#[derive(Default)]
struct FakeHistory {
    entries: Vec<RawHistoryEntry>,
    fail: bool,
    requests: Mutex<Vec<(String, String, u8)>>,
}

#[async_trait]
impl ChannelHistory for FakeHistory {
    async fn recent_messages(
        &self,
        channel_id: &str,
        before: &str,
        limit: u8,
    ) -> Result<Vec<RawHistoryEntry>, DiscordError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((channel_id.to_string(), before.to_string(), limit));
        }
        if self.fail {
            return Err(DiscordError::Api {
                status: 403,
                body: "Missing Access".to_string(),
            });
        }
        Ok(self.entries.iter().take(usize::from(limit)).cloned().collect())
    }
}

#[derive(Default)]
struct FakeMessenger {
    sent: Mutex<Vec<(String, String)>>,
    typing: AtomicUsize,
}

impl FakeMessenger {
    fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|s| s.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChannelMessenger for FakeMessenger {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DiscordError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((channel_id.to_string(), content.to_string()));
        }
        Ok(())
    }

    async fn trigger_typing(&self, _channel_id: &str) -> Result<(), DiscordError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider that records the turns it receives.
struct RecordingProvider {
    reply: Option<String>,
    seen: Arc<Mutex<Vec<Vec<ConversationTurn>>>>,
}

#[async_trait]
impl LlmProvider for RecordingProvider {
    async fn chat_completion(
        &self,
        turns: &[ConversationTurn],
        _model_id: &str,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(turns.to_vec());
        }
        self.reply
            .clone()
            .ok_or_else(|| LlmError::ApiError("503 Service Unavailable".to_string()))
    }
}

struct RecordingFactory {
    reply: Option<String>,
    seen: Arc<Mutex<Vec<Vec<ConversationTurn>>>>,
}

impl ProviderFactory for RecordingFactory {
    fn build(&self, _api_key: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        Ok(Arc::new(RecordingProvider {
            reply: self.reply.clone(),
            seen: Arc::clone(&self.seen),
        }))
    }
}

struct Harness {
    handler: ChatHandler,
    history: Arc<FakeHistory>,
    messenger: Arc<FakeMessenger>,
    seen: Arc<Mutex<Vec<Vec<ConversationTurn>>>>,
    bot: BotIdentity,
}

impl Harness {
    fn new(history: FakeHistory, reply: Option<&str>, mention_required: bool) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            reply: reply.map(str::to_string),
            seen: Arc::clone(&seen),
        };
        let pool = Arc::new(CredentialPool::new(["gsk_a", "gsk_b"]).expect("pool"));
        let invoker = Arc::new(CompletionInvoker::new(
            pool,
            Arc::new(factory),
            InvokerOptions::default(),
        ));

        let settings = Arc::new(DiscordSettings {
            discord_token: "token".to_string(),
            mention_required,
            ..DiscordSettings::default()
        });
        let history = Arc::new(history);
        let messenger = Arc::new(FakeMessenger::default());
        let handler = ChatHandler::new(
            history.clone(),
            messenger.clone(),
            invoker,
            settings,
            "You are KAZ.",
        );

        Self {
            handler,
            history,
            messenger,
            seen,
            bot: BotIdentity::new(BOT_ID),
        }
    }

    async fn handle(&self, msg: DiscordMessage) -> Outcome {
        self.handler
            .handle_message(&self.bot, msg)
            .await
            .expect("handler succeeds")
    }

    fn seen(&self) -> Vec<Vec<ConversationTurn>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

fn user(id: &str) -> DiscordUser {
    DiscordUser {
        id: id.to_string(),
        username: format!("user{id}"),
        bot: false,
    }
}

fn message(author: &str, content: &str) -> DiscordMessage {
    let mentions = if content.contains(&format!("<@{BOT_ID}>")) {
        vec![user(BOT_ID)]
    } else {
        Vec::new()
    };
    DiscordMessage {
        id: "5000".to_string(),
        channel_id: CHANNEL.to_string(),
        author: user(author),
        content: content.to_string(),
        mentions,
        mention_everyone: false,
    }
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let harness = Harness::new(FakeHistory::default(), Some("hi"), false);

    let outcome = harness.handle(message(BOT_ID, "I said something")).await;

    assert_eq!(outcome, Outcome::IgnoredOwn);
    assert!(harness.messenger.sent().is_empty());
    assert!(harness.seen().is_empty());
}

#[tokio::test]
async fn toggle_command_flips_mode_and_posts_status() {
    let harness = Harness::new(FakeHistory::default(), Some("hi"), false);

    let first = harness.handle(message("7", "!kaz_toggle_mention")).await;
    let second = harness.handle(message("7", "!kaz_toggle_mention")).await;

    assert_eq!(first, Outcome::Toggled(true));
    assert_eq!(second, Outcome::Toggled(false));
    assert_eq!(
        harness.messenger.sent(),
        vec![
            "ボットの返信にメンションが**必須**になりました。".to_string(),
            "ボットの返信にメンションが**不要**になりました。".to_string(),
        ]
    );
    // the command itself never reaches the model
    assert!(harness.seen().is_empty());
}

#[tokio::test]
async fn mention_required_mode_ignores_unaddressed_messages() {
    let harness = Harness::new(FakeHistory::default(), Some("yo"), true);

    let ignored = harness.handle(message("7", "anyone here?")).await;
    let answered = harness.handle(message("7", "<@42> are you there?")).await;

    assert_eq!(ignored, Outcome::NotAddressed);
    assert_eq!(answered, Outcome::Replied(1));
    assert_eq!(harness.messenger.sent(), vec!["yo".to_string()]);
}

#[tokio::test]
async fn reply_uses_ordered_history_and_stripped_prompt() {
    let history = FakeHistory {
        entries: vec![
            RawHistoryEntry::new(BOT_ID, "sure!"),
            RawHistoryEntry::new("7", "<@42> hi"),
        ],
        ..FakeHistory::default()
    };
    let harness = Harness::new(history, Some("  all good  "), false);

    let outcome = harness.handle(message("7", "<@42> what's up")).await;

    assert_eq!(outcome, Outcome::Replied(1));
    assert_eq!(
        harness.seen(),
        vec![vec![
            ConversationTurn::system("You are KAZ."),
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("sure!"),
            ConversationTurn::user("what's up"),
        ]]
    );
    assert_eq!(harness.messenger.sent(), vec!["all good".to_string()]);

    let requests = harness.history.requests.lock().map(|r| r.clone()).unwrap_or_default();
    assert_eq!(requests, vec![(CHANNEL.to_string(), "5000".to_string(), 8)]);

    // let the typing task observe its first tick
    tokio::task::yield_now().await;
    assert!(harness.messenger.typing.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn long_replies_are_split_under_the_limit() {
    let long_reply = "this is a fairly long line of model output\n".repeat(200);
    let harness = Harness::new(FakeHistory::default(), Some(long_reply.as_str()), false);

    let outcome = harness.handle(message("7", "tell me everything")).await;

    let sent = harness.messenger.sent();
    assert!(sent.len() > 1);
    assert_eq!(outcome, Outcome::Replied(sent.len()));
    assert!(sent.iter().all(|part| part.chars().count() <= DISCORD_MESSAGE_LIMIT));
    assert_eq!(sent.join("\n"), long_reply.trim());
}

#[tokio::test]
async fn provider_failure_sends_fallback() {
    let harness = Harness::new(FakeHistory::default(), None, false);

    let outcome = harness.handle(message("7", "hello?")).await;

    assert_eq!(outcome, Outcome::Replied(1));
    assert_eq!(harness.messenger.sent(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);
    assert_eq!(harness.seen().len(), 1);
}

#[tokio::test]
async fn blank_completion_sends_fallback() {
    let harness = Harness::new(FakeHistory::default(), Some("   \n "), false);

    harness.handle(message("7", "hello?")).await;

    assert_eq!(harness.messenger.sent(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);
}

#[tokio::test]
async fn history_failure_still_replies() {
    let history = FakeHistory {
        fail: true,
        ..FakeHistory::default()
    };
    let harness = Harness::new(history, Some("ok"), false);

    let outcome = harness.handle(message("7", "<@!42> ping")).await;

    assert_eq!(outcome, Outcome::Replied(1));
    assert_eq!(
        harness.seen(),
        vec![vec![
            ConversationTurn::system("You are KAZ."),
            ConversationTurn::user("ping"),
        ]]
    );
}
