//! Raw field bag → [`CanonicalResult`].

pub mod units;

use chrono::Utc;
use thiserror::Error;

use crate::domain::{
    required_fields, CanonicalResult, ContentType, Creator, ExtractionAttempt, Field, Outcome,
    Platform, RawFields, StrategyId, Target,
};

pub use units::{
    clean_text, extract_hashtags, extract_mentions, normalize_date, parse_count, parse_duration,
};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Attempt by {strategy} ended {outcome}; nothing to normalize")]
    NoData {
        strategy: StrategyId,
        outcome: Outcome,
    },
}

/// Fraction of the target's required fields present in `raw`
pub fn completeness(raw: &RawFields, target: &Target) -> f64 {
    let required = required_fields(target.platform(), target.content_type());
    if required.is_empty() {
        return 1.0;
    }
    let resolved = required.iter().filter(|f| raw.contains_key(f)).count();
    resolved as f64 / required.len() as f64
}

/// Required fields missing from `raw`
pub fn missing_required(raw: &RawFields, target: &Target) -> Vec<Field> {
    required_fields(target.platform(), target.content_type())
        .iter()
        .copied()
        .filter(|f| !raw.contains_key(f))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        attempt: &ExtractionAttempt,
        target: &Target,
    ) -> Result<CanonicalResult, NormalizeError> {
        if !attempt.outcome.produced_data() {
            return Err(NormalizeError::NoData {
                strategy: attempt.strategy.clone(),
                outcome: attempt.outcome,
            });
        }

        let raw = &attempt.raw_fields;
        let text = |field: Field| {
            raw.get(&field)
                .map(|v| clean_text(v))
                .filter(|v| !v.is_empty())
        };
        let count = |field: Field| raw.get(&field).and_then(|v| parse_count(v));

        let title = text(Field::Title);
        let description = text(Field::Description);

        let view_count = count(Field::ViewCount);
        let like_count = count(Field::LikeCount);
        let comment_count = count(Field::CommentCount);
        let share_count = count(Field::ShareCount);

        let duration_secs = if target.content_type().has_duration() {
            raw.get(&Field::Duration).and_then(|v| parse_duration(v))
        } else {
            None
        };

        let upload_date = raw
            .get(&Field::UploadDate)
            .map(|v| normalize_date(v).unwrap_or_else(|| clean_text(v)))
            .filter(|v| !v.is_empty());

        let username = text(Field::CreatorUsername)
            .map(|u| u.trim_start_matches('@').to_string())
            .or_else(|| target.owner().map(str::to_string));
        let profile_url = text(Field::CreatorProfileUrl).or_else(|| {
            username
                .as_deref()
                .map(|u| default_profile_url(target.platform(), u))
        });
        let creator = Creator {
            username,
            profile_url,
            follower_count: count(Field::CreatorFollowerCount),
        };

        let scan = [title.as_deref(), description.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n");
        let mut hashtags = extract_hashtags(&scan);
        if target.content_type() == ContentType::Hashtag {
            hashtags.insert(target.canonical_id().to_string());
        }
        let mentions = extract_mentions(&scan);

        let engagement_rate = view_count.filter(|v| *v > 0).and_then(|views| {
            let interactions = [like_count, comment_count, share_count];
            if interactions.iter().all(Option::is_none) {
                return None;
            }
            let total: u64 = interactions.iter().flatten().sum();
            Some(total as f64 / views as f64)
        });

        let completeness_score = completeness(raw, target);
        let missing_fields = missing_required(raw, target);

        Ok(CanonicalResult {
            platform: target.platform(),
            content_type: target.content_type(),
            canonical_id: target.canonical_id().to_string(),
            source_url: target.canonical_url(),
            title,
            description,
            view_count,
            like_count,
            comment_count,
            share_count,
            duration_secs,
            upload_date,
            creator,
            hashtags,
            mentions,
            thumbnail_url: text(Field::ThumbnailUrl),
            engagement_rate,
            raw_strategy_used: attempt.strategy.clone(),
            completeness_score,
            degraded: !missing_fields.is_empty(),
            missing_fields,
            analysis: None,
            fetched_at: Utc::now(),
        })
    }
}

fn default_profile_url(platform: Platform, username: &str) -> String {
    match platform {
        Platform::YouTube => format!("https://www.youtube.com/@{}", username),
        Platform::Instagram => format!("https://www.instagram.com/{}/", username),
        Platform::TikTok => format!("https://www.tiktok.com/@{}", username),
        Platform::Twitter => format!("https://x.com/{}", username),
        Platform::Unknown => username.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classifier::classify;

    fn attempt(target: &Target, outcome: Outcome, fields: &[(Field, &str)]) -> ExtractionAttempt {
        ExtractionAttempt {
            strategy: StrategyId::new("browser_dom"),
            target: target.clone(),
            started_at: Utc::now(),
            duration: Duration::from_millis(10),
            outcome,
            raw_fields: fields
                .iter()
                .map(|(f, v)| (*f, v.to_string()))
                .collect(),
            gaps: Vec::new(),
            error: None,
            skip_reason: None,
        }
    }

    #[test]
    fn test_normalize_converts_units() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let a = attempt(
            &target,
            Outcome::Partial,
            &[
                (Field::Title, "Never Gonna Give You Up"),
                (Field::ViewCount, "1.2B"),
                (Field::LikeCount, "17M"),
                (Field::Duration, "PT3M33S"),
                (Field::UploadDate, "2009-10-25T06:57:33-07:00"),
            ],
        );

        let result = Normalizer::new().normalize(&a, &target).unwrap();
        assert_eq!(result.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(result.view_count, Some(1_200_000_000));
        assert_eq!(result.like_count, Some(17_000_000));
        assert_eq!(result.duration_secs, Some(213));
        assert_eq!(result.upload_date.as_deref(), Some("2009-10-25"));
        assert_eq!(result.raw_strategy_used.as_str(), "browser_dom");
    }

    #[test]
    fn test_completeness_matches_required_ratio() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let a = attempt(
            &target,
            Outcome::Partial,
            &[
                (Field::Title, "x"),
                (Field::ViewCount, "10"),
                (Field::LikeCount, "2"),
                (Field::Description, "not required"),
            ],
        );

        let result = Normalizer::new().normalize(&a, &target).unwrap();
        assert!((result.completeness_score - 0.6).abs() < 1e-9);
        assert!(result.degraded);
        assert_eq!(
            result.missing_fields,
            vec![Field::UploadDate, Field::CreatorUsername]
        );
    }

    #[test]
    fn test_completeness_bounds() {
        let target = classify("https://www.instagram.com/natgeo/").unwrap();
        assert_eq!(completeness(&RawFields::new(), &target), 0.0);

        let full: RawFields = required_fields(target.platform(), target.content_type())
            .iter()
            .map(|f| (*f, "1".to_string()))
            .collect();
        assert_eq!(completeness(&full, &target), 1.0);
    }

    #[test]
    fn test_profile_has_no_duration_and_gets_defaults() {
        let target = classify("https://www.tiktok.com/@scout2015").unwrap();
        let a = attempt(
            &target,
            Outcome::Partial,
            &[
                (Field::Title, "Scout"),
                (Field::CreatorFollowerCount, "1.1M Followers"),
                (Field::Duration, "0:30"),
            ],
        );

        let result = Normalizer::new().normalize(&a, &target).unwrap();
        assert_eq!(result.duration_secs, None);
        assert_eq!(result.creator.username.as_deref(), Some("scout2015"));
        assert_eq!(
            result.creator.profile_url.as_deref(),
            Some("https://www.tiktok.com/@scout2015")
        );
        assert_eq!(result.creator.follower_count, Some(1_100_000));
    }

    #[test]
    fn test_hashtags_mentions_and_engagement() {
        let target = classify("https://www.instagram.com/reel/C1a2B3c4D5e/").unwrap();
        let a = attempt(
            &target,
            Outcome::Success,
            &[
                (Field::Title, "Golden hour with @Alice #Sunset"),
                (Field::Description, "More #travel soon"),
                (Field::ViewCount, "1,000"),
                (Field::LikeCount, "90"),
                (Field::CommentCount, "10"),
                (Field::CreatorUsername, "@natgeo"),
            ],
        );

        let result = Normalizer::new().normalize(&a, &target).unwrap();
        assert!(result.hashtags.contains("sunset"));
        assert!(result.hashtags.contains("travel"));
        assert!(result.mentions.contains("alice"));
        assert_eq!(result.creator.username.as_deref(), Some("natgeo"));
        assert_eq!(result.engagement_rate, Some(0.1));
        assert!(!result.degraded);
        assert_eq!(result.completeness_score, 1.0);
    }

    #[test]
    fn test_failed_attempt_is_rejected() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let a = attempt(&target, Outcome::Failed, &[]);
        assert!(matches!(
            Normalizer::new().normalize(&a, &target),
            Err(NormalizeError::NoData { .. })
        ));
    }
}
