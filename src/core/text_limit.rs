//! Fit post text under a platform's character limit.
//!
//! Order of attempts: the text as-is, the text without hashtags, a summary
//! from the text generator, and finally a hard cut with an ellipsis. An
//! appended media link is never cut and counts against the limit.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::adapters::TextGenerator;

const ELLIPSIS: char = '…';

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(^|\s)#[\p{L}\p{N}_]+").expect("static regex"))
}

fn spaces_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("static regex"))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Remove hashtags and the whitespace they leave behind
pub fn strip_hashtags(text: &str) -> String {
    let stripped = hashtag_pattern().replace_all(text, "$1");
    let collapsed = spaces_pattern().replace_all(&stripped, " ");
    collapsed
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Cut to at most `budget` characters, ending in an ellipsis when cut
pub fn truncate(text: &str, budget: usize) -> String {
    if char_len(text) <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    let mut cut: String = text.chars().take(budget - 1).collect();
    let trimmed_len = cut.trim_end().len();
    cut.truncate(trimmed_len);
    cut.push(ELLIPSIS);
    cut
}

fn with_link(body: &str, link: Option<&str>) -> String {
    match link {
        Some(url) if body.is_empty() => url.to_string(),
        Some(url) => format!("{}\n\n{}", body, url),
        None => body.to_string(),
    }
}

/// Produce the text to send to one platform
pub async fn fit_text(
    text: &str,
    limit: Option<usize>,
    media_link: Option<&str>,
    generator: Option<&dyn TextGenerator>,
) -> String {
    let Some(limit) = limit else {
        return with_link(text, media_link);
    };

    let link_cost = media_link.map(|u| char_len(u) + 2).unwrap_or(0);
    let budget = limit.saturating_sub(link_cost);

    if char_len(text) <= budget {
        return with_link(text, media_link);
    }

    let stripped = strip_hashtags(text);
    if char_len(&stripped) <= budget {
        debug!(limit, "Fitted text by removing hashtags");
        return with_link(&stripped, media_link);
    }

    if let Some(generator) = generator {
        let system = format!(
            "Shorten the user's social media post to at most {} characters. \
             Keep the meaning and tone. Reply with the post text only.",
            budget
        );
        match generator.generate(&system, &stripped).await {
            Ok(summary) => {
                debug!(limit, "Fitted text by summarizing");
                return with_link(&truncate(summary.trim(), budget), media_link);
            }
            Err(e) => warn!(error = %e, "Summarization failed, truncating instead"),
        }
    }

    with_link(&truncate(&stripped, budget), media_link)
}
