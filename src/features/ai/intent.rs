//! Trigger-phrase intent classification
//!
//! Decides, per message, whether the bot is being asked a question or told
//! to perform a moderation action, based on a configured trigger phrase
//! prefix ("oh kp baa ...").
//!
//! Known quirk, kept deliberately: the moderation keywords are matched as
//! substrings of the whole remainder, so an ordinary question that happens
//! to contain a word like "ban" is classified as a moderation directive
//! whenever the message also mentions someone. See the test suite.

use regex::Regex;
use std::sync::OnceLock;

/// Moderation action requested in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    Kick,
    Ban,
    Mute,
    Unmute,
}

impl ModAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModAction::Kick => "kick",
            ModAction::Ban => "ban",
            ModAction::Mute => "mute",
            ModAction::Unmute => "unmute",
        }
    }
}

/// What a trigger-phrase message is asking for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AskAi {
        prompt: String,
    },
    Moderate {
        action: ModAction,
        target_user_id: u64,
        reason: String,
    },
    None,
}

pub const DEFAULT_REASON: &str = "No reason provided";

// Unmute is scanned before mute so its substring cannot shadow it.
const KEYWORDS: [(&str, ModAction); 4] = [
    ("kick", ModAction::Kick),
    ("ban", ModAction::Ban),
    ("unmute", ModAction::Unmute),
    ("mute", ModAction::Mute),
];

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").unwrap())
}

/// Classify a raw message against the configured trigger phrase.
///
/// Text that does not start with the phrase (case-insensitive) is not
/// addressed to the bot at all. An empty remainder is an `AskAi` with an
/// empty prompt; the caller turns that into a usage hint rather than an
/// API call.
pub fn classify(text: &str, trigger_phrase: &str) -> Intent {
    if trigger_phrase.is_empty() {
        return Intent::None;
    }
    let remainder = match strip_prefix_ignore_ascii_case(text, trigger_phrase) {
        Some(rest) => rest.trim(),
        None => return Intent::None,
    };

    if remainder.is_empty() {
        return Intent::AskAi {
            prompt: String::new(),
        };
    }

    let target = first_mention(text);
    let lowered = remainder.to_lowercase();
    for (keyword, action) in KEYWORDS {
        if lowered.contains(keyword) {
            if let Some(target_user_id) = target {
                return Intent::Moderate {
                    action,
                    target_user_id,
                    reason: extract_reason(remainder, keyword),
                };
            }
            break;
        }
    }

    Intent::AskAi {
        prompt: remainder.to_string(),
    }
}

/// Cheap prefix test, for callers that only need to know whether a
/// message is addressed to the bot at all
pub fn is_addressed(text: &str, trigger_phrase: &str) -> bool {
    !trigger_phrase.is_empty() && strip_prefix_ignore_ascii_case(text, trigger_phrase).is_some()
}

/// First `<@id>` / `<@!id>` token in the text, if any
pub fn first_mention(text: &str) -> Option<u64> {
    mention_regex()
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn strip_prefix_ignore_ascii_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text;
    for expected in prefix.chars() {
        let mut chars = rest.chars();
        let got = chars.next()?;
        if !got.eq_ignore_ascii_case(&expected) {
            return None;
        }
        rest = chars.as_str();
    }
    Some(rest)
}

/// The remainder minus the matched action keyword and any mention tokens,
/// collapsed to single spaces. Falls back to a placeholder when nothing
/// is left.
fn extract_reason(remainder: &str, keyword: &str) -> String {
    static KEYWORD_RES: OnceLock<Vec<(String, Regex)>> = OnceLock::new();
    let regexes = KEYWORD_RES.get_or_init(|| {
        KEYWORDS
            .iter()
            .map(|(kw, _)| {
                (
                    kw.to_string(),
                    Regex::new(&format!("(?i){}", regex::escape(kw))).unwrap(),
                )
            })
            .collect()
    });

    let mut reason = remainder.to_string();
    if let Some((_, re)) = regexes.iter().find(|(kw, _)| kw == keyword) {
        reason = re.replace(&reason, "").into_owned();
    }
    reason = mention_regex().replace_all(&reason, "").into_owned();

    let reason = reason.split_whitespace().collect::<Vec<_>>().join(" ");
    if reason.is_empty() {
        DEFAULT_REASON.to_string()
    } else {
        reason
    }
}
