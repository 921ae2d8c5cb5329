use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([kmb])?(?:[^a-z]|$)").expect("count pattern")
});

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?T?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?$")
        .expect("duration pattern")
});

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag pattern"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w/])@([A-Za-z0-9_.]+)").expect("mention pattern"));

/// Words that may follow a count. Anything else ("5 months ago") means the
/// number is not an engagement count.
const COUNT_NOUNS: &[&str] = &[
    "view", "views", "like", "likes", "comment", "comments", "share", "shares", "play",
    "plays", "follower", "followers", "repost", "reposts", "retweet", "retweets", "reply",
    "replies", "save", "saves", "subscriber", "subscribers", "watching", "other", "others",
    "people",
];

/// Parse a human-formatted count: `"1,234"`, `"1.2M"`, `"12.5K likes"`, `"1.2B views"`.
///
/// The first number in the text wins, so aria-labels such as
/// `"like this video along with 12,345 other people"` parse too.
pub fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim();
    let caps = COUNT.captures(text)?;
    let number_end = caps.get(2).or_else(|| caps.get(1)).map_or(0, |m| m.end());
    let next_word: String = text[number_end..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if !next_word.is_empty() && !COUNT_NOUNS.contains(&next_word.as_str()) {
        return None;
    }

    let number: f64 = caps[1].replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000.0,
        Some(ref s) if s == "m" => 1_000_000.0,
        Some(ref s) if s == "b" => 1_000_000_000.0,
        _ => 1.0,
    };
    Some((number * multiplier).round() as u64)
}

/// Parse a duration in seconds from ISO 8601 (`PT4M13S`), clock (`4:13`,
/// `1:02:03`) or plain seconds.
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_DURATION.captures(text) {
        if text.len() > 2 {
            let part = |i: usize| -> f64 {
                caps.get(i)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            let secs = part(1) * 86_400.0 + part(2) * 3_600.0 + part(3) * 60.0 + part(4);
            return Some(secs.round() as u64);
        }
        return None;
    }

    if text.contains(':') {
        let mut total = 0u64;
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() > 3 {
            return None;
        }
        for part in parts {
            let value: u64 = part.trim().parse().ok()?;
            total = total.checked_mul(60)?.checked_add(value)?;
        }
        return Some(total);
    }

    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64)
}

/// Normalise a date to `YYYY-MM-DD` when the format is recognised.
pub fn normalize_date(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    if text.len() == 10 && text.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = text.parse().ok()?;
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Collapse whitespace, drop zero-width characters and decode HTML entities
pub fn clean_text(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    decoded
        .chars()
        .filter(|c| !matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cased hashtags without the leading `#`.
///
/// A tag starts the text, follows a separator or directly follows another
/// tag (`#a#b`); `me#x`, `&#39;` and URL fragments are not tags.
pub fn extract_hashtags(text: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    let mut previous_end = None;
    for m in HASHTAG.find_iter(text) {
        let starts_tag = previous_end == Some(m.start())
            || text[..m.start()]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_alphanumeric() || matches!(c, '_' | '&' | '/')));
        if starts_tag {
            tags.insert(m.as_str()[1..].to_lowercase());
            previous_end = Some(m.end());
        }
    }
    tags
}

/// Lower-cased mentions without the leading `@`
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    MENTION
        .captures_iter(text)
        .map(|c| c[1].trim_end_matches('.').to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}
