//! Question deck loading.
//!
//! Authoring lives outside the coordinator; the deck is read once at
//! startup and shared read-only across every session.

use std::fs;
use std::path::Path;

use anyhow::Context;

use trivium_protocol::Question;

/// Load the deck from a JSON file (an array of `{text, options}`), or fall
/// back to the built-in demo deck.
pub fn load_deck(path: Option<&Path>) -> anyhow::Result<Vec<Question>> {
    let deck: Vec<Question> = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading question deck {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing question deck {}", path.display()))?
        }
        None => builtin_deck(),
    };

    if deck.is_empty() {
        anyhow::bail!("question deck is empty");
    }
    Ok(deck)
}

fn builtin_deck() -> Vec<Question> {
    let q = |text: &str, options: &[&str]| Question {
        text: text.to_string(),
        options: options.iter().map(|s| s.to_string()).collect(),
    };

    vec![
        q(
            "Which planet is the largest in the solar system?",
            &["Mars", "Jupiter", "Saturn", "Neptune"],
        ),
        q(
            "What year did the first moon landing take place?",
            &["1965", "1967", "1969", "1971"],
        ),
        q(
            "Which ocean is the deepest?",
            &["Atlantic", "Indian", "Arctic", "Pacific"],
        ),
    ]
}
