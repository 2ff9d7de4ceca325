use kaz_bot_core::conversation::{
    assemble, BotIdentity, ConversationTurn, MentionToken, RawHistoryEntry, Role,
};
use proptest::prelude::*;

const BOT: &str = "112233445566778899";

fn entry() -> impl Strategy<Value = RawHistoryEntry> {
    (
        prop_oneof![Just(BOT.to_string()), "[0-9]{5,18}"],
        prop_oneof![
            "\\PC{0,40}",
            "[a-z ]{0,10}".prop_map(|s| format!("<@{BOT}> {s}")),
            "[a-z ]{0,10}".prop_map(|s| format!("{s}<@!{BOT}>")),
            Just(format!("<@{BOT}>")),
        ],
    )
        .prop_map(|(author, content)| RawHistoryEntry::new(author, content))
}

proptest! {
    /// The system turn comes first and the live prompt last, for any history.
    #[test]
    fn system_first_prompt_last(
        history in prop::collection::vec(entry(), 0..8),
        prompt in "\\PC{0,20}",
        context in "\\PC{1,20}",
    ) {
        let bot = BotIdentity::new(BOT);
        let turns = assemble(&history, &prompt, &bot, &context);

        let system = ConversationTurn::system(&context);
        let live = ConversationTurn::user(&prompt);
        prop_assert_eq!(turns.first(), Some(&system));
        prop_assert_eq!(turns.last(), Some(&live));
        prop_assert_eq!(turns.iter().filter(|t| t.role == Role::System).count(), 1);
        prop_assert!(turns.len() <= history.len() + 2);
    }

    /// Every bot entry survives verbatim, in oldest-first order.
    #[test]
    fn bot_entries_become_assistant_turns(history in prop::collection::vec(entry(), 0..8)) {
        let bot = BotIdentity::new(BOT);
        let turns = assemble(&history, "p", &bot, "ctx");

        let expected: Vec<&str> = history
            .iter()
            .rev()
            .filter(|e| e.author_id == BOT)
            .map(|e| e.content.as_str())
            .collect();
        let actual: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
            .collect();
        prop_assert_eq!(actual, expected);
    }

    /// User turns taken from history are never empty and never mention the bot.
    #[test]
    fn history_user_turns_are_clean(history in prop::collection::vec(entry(), 0..8)) {
        let bot = BotIdentity::new(BOT);
        let turns = assemble(&history, "p", &bot, "ctx");

        for turn in &turns[1..turns.len() - 1] {
            if turn.role == Role::User {
                prop_assert!(!turn.content.is_empty());
                prop_assert!(!bot.mention().is_mentioned_in(&turn.content));
                prop_assert_eq!(turn.content.trim(), turn.content.as_str());
            }
        }
    }

    /// Assembly has no hidden state.
    #[test]
    fn assembly_is_idempotent(history in prop::collection::vec(entry(), 0..8), prompt in "\\PC{0,20}") {
        let bot = BotIdentity::new(BOT);
        prop_assert_eq!(
            assemble(&history, &prompt, &bot, "ctx"),
            assemble(&history, &prompt, &bot, "ctx")
        );
    }

    /// Stripping removes both mention variants and is stable.
    #[test]
    fn strip_is_idempotent(prefix in "[a-zA-Z0-9 ]*", suffix in "[a-zA-Z0-9 ]*", nick in proptest::bool::ANY) {
        let mention = MentionToken::for_id(BOT);
        let token = if nick { format!("<@!{BOT}>") } else { format!("<@{BOT}>") };
        let once = mention.strip(&format!("{prefix}{token}{suffix}"));

        prop_assert!(!once.contains(&token));
        prop_assert_eq!(mention.strip(&once), once.clone());
    }
}
