//! # Witty Responses Feature
//!
//! Replies with a configured one-liner when a message contains a trigger
//! word. Matching is whole-word and case-insensitive; which response is
//! sent (and whether the author gets mentioned or a reaction) is random.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true

use rand::seq::IndexedRandom;
use regex::Regex;
use std::collections::HashMap;

/// Chance that a witty reply mentions the author
pub const MENTION_CHANCE: f64 = 0.2;
/// Chance that a witty reply also adds a reaction
pub const REACTION_CHANCE: f64 = 0.1;

/// All configured trigger words appearing as whole words in the content
pub fn find_trigger_words(content: &str, trigger_words: &[String]) -> Vec<String> {
    let content_lower = content.to_lowercase();
    trigger_words
        .iter()
        .filter(|word| {
            let pattern = format!(r"\b{}\b", regex::escape(&word.to_lowercase()));
            Regex::new(&pattern)
                .map(|re| re.is_match(&content_lower))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Random response for one of the matched trigger words
pub fn pick_response(
    responses: &HashMap<String, Vec<String>>,
    matched_words: &[String],
) -> Option<String> {
    let mut rng = rand::rng();
    let word = matched_words.choose(&mut rng)?;
    responses.get(word)?.choose(&mut rng).cloned()
}
