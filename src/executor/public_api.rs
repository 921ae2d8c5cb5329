use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use crate::domain::{ContentType, Platform, ResolveHints, StrategyId, Target};
use crate::executor::settings::HttpSettings;
use crate::executor::{ExecError, Executor, Mechanism, ParsedContent, Session};
use crate::extractor::{specs, FieldSpec};

pub const STRATEGY_ID: &str = "public_api";

/// Base URLs of the public endpoints
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub youtube: String,
    pub tiktok_oembed: String,
    pub twitter_syndication: String,
    pub instagram_graph: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            youtube: "https://www.googleapis.com/youtube/v3".to_string(),
            tiktok_oembed: "https://www.tiktok.com/oembed".to_string(),
            twitter_syndication: "https://cdn.syndication.twimg.com".to_string(),
            instagram_graph: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Every endpoint under one base URL, for local test servers
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            youtube: format!("{}/youtube/v3", base),
            tiktok_oembed: format!("{}/oembed", base),
            twitter_syndication: base.to_string(),
            instagram_graph: format!("{}/graph", base),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiCall {
    YouTubeData,
    OEmbed,
    TweetResult,
}

/// Public, documented endpoints: YouTube Data API v3, TikTok oEmbed,
/// Twitter syndication and Instagram Graph oEmbed
pub struct PublicApiExecutor {
    client: Client,
    youtube_api_key: Option<String>,
    instagram_access_token: Option<String>,
    endpoints: ApiEndpoints,
}

impl PublicApiExecutor {
    pub fn new(
        settings: &HttpSettings,
        youtube_api_key: Option<String>,
        instagram_access_token: Option<String>,
    ) -> Result<Self, ExecError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .gzip(true)
            .user_agent(concat!("clipscout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            youtube_api_key: youtube_api_key.filter(|k| !k.trim().is_empty()),
            instagram_access_token: instagram_access_token.filter(|t| !t.trim().is_empty()),
            endpoints: ApiEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: ApiEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn call_for(platform: Platform) -> Option<ApiCall> {
        match platform {
            Platform::YouTube => Some(ApiCall::YouTubeData),
            Platform::TikTok | Platform::Instagram => Some(ApiCall::OEmbed),
            Platform::Twitter => Some(ApiCall::TweetResult),
            Platform::Unknown => None,
        }
    }

    fn request_url(&self, target: &Target) -> Result<Url, ExecError> {
        let id = target.canonical_id();
        let url = match target.platform() {
            Platform::YouTube => {
                let key = self.youtube_api_key.as_deref().unwrap_or_default();
                if target.content_type() == ContentType::Profile {
                    let selector = if id.starts_with("UC") && id.len() == 24 {
                        ("id", id.to_string())
                    } else {
                        ("forHandle", format!("@{}", id))
                    };
                    Url::parse_with_params(
                        &format!("{}/channels", self.endpoints.youtube),
                        &[
                            ("part", "snippet,statistics".to_string()),
                            selector,
                            ("key", key.to_string()),
                        ],
                    )
                } else {
                    Url::parse_with_params(
                        &format!("{}/videos", self.endpoints.youtube),
                        &[
                            ("part", "snippet,statistics,contentDetails"),
                            ("id", id),
                            ("key", key),
                        ],
                    )
                }
            }
            Platform::TikTok => Url::parse_with_params(
                &self.endpoints.tiktok_oembed,
                &[("url", target.canonical_url())],
            ),
            Platform::Instagram => Url::parse_with_params(
                &format!("{}/instagram_oembed", self.endpoints.instagram_graph),
                &[
                    ("url", target.canonical_url()),
                    (
                        "access_token",
                        self.instagram_access_token.clone().unwrap_or_default(),
                    ),
                ],
            ),
            Platform::Twitter => {
                let tweet_id = target.media_id();
                Url::parse_with_params(
                    &format!("{}/tweet-result", self.endpoints.twitter_syndication),
                    &[
                        ("id", tweet_id.to_string()),
                        ("lang", "en".to_string()),
                        ("token", syndication_token(tweet_id)),
                    ],
                )
            }
            Platform::Unknown => {
                return Err(ExecError::Malformed("no public API for unknown platforms".into()))
            }
        };
        // Parse errors never contain the query, so keys stay out of messages.
        url.map_err(|e| ExecError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Executor for PublicApiExecutor {
    fn id(&self) -> StrategyId {
        StrategyId::new(STRATEGY_ID)
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::PublicApi
    }

    fn supports(&self, platform: Platform) -> bool {
        Self::call_for(platform).is_some()
    }

    fn skip_reason(&self, target: &Target) -> Option<String> {
        use ContentType::*;

        match (target.platform(), target.content_type()) {
            (Platform::Unknown, _) => Some("no public API for unknown platforms".into()),
            (Platform::YouTube, _) if self.youtube_api_key.is_none() => {
                Some("YouTube Data API key not configured".into())
            }
            (Platform::YouTube, Hashtag | Post) => Some(format!(
                "YouTube Data API has no lookup for {} targets",
                target.content_type()
            )),
            (Platform::Instagram, _) if self.instagram_access_token.is_none() => {
                Some("Instagram access token not configured".into())
            }
            (Platform::Instagram | Platform::TikTok | Platform::Twitter, Profile | Hashtag) => {
                Some(format!(
                    "{} public endpoint only covers individual posts",
                    target.platform().display_name()
                ))
            }
            _ => None,
        }
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec> {
        match Self::call_for(target.platform()) {
            Some(ApiCall::YouTubeData) => specs::youtube_api_specs(target),
            Some(ApiCall::OEmbed) => specs::oembed_specs(target),
            Some(ApiCall::TweetResult) => specs::tweet_result_specs(target),
            None => Vec::new(),
        }
    }

    async fn open(
        &self,
        target: &Target,
        _hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError> {
        let call = Self::call_for(target.platform())
            .ok_or_else(|| ExecError::Malformed("no public API for unknown platforms".into()))?;
        Ok(Box::new(ApiSession {
            client: self.client.clone(),
            url: self.request_url(target)?,
            call,
        }))
    }
}

struct ApiSession {
    client: Client,
    url: Url,
    call: ApiCall,
}

#[async_trait]
impl Session for ApiSession {
    async fn fetch(&mut self, _target: &Target) -> Result<ParsedContent, ExecError> {
        let response = self.client.get(self.url.clone()).send().await?;

        // Quota errors arrive as 403 with a reason in the body.
        if self.call == ApiCall::YouTubeData && response.status() == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if body.contains("quotaExceeded") || body.contains("rateLimitExceeded") {
                return Err(ExecError::RateLimited {
                    message: "YouTube Data API quota exhausted".to_string(),
                    retry_after: None,
                });
            }
            return Err(ExecError::Blocked("HTTP 403".to_string()));
        }
        ExecError::check_response(&response)?;

        let document: Value = response.json().await?;
        match self.call {
            ApiCall::YouTubeData => {
                let empty = document["items"].as_array().map_or(true, |items| items.is_empty());
                if empty {
                    return Err(ExecError::NotFound("no YouTube item for this id".to_string()));
                }
            }
            ApiCall::TweetResult => {
                let tombstone = document["__typename"].as_str() == Some("TweetTombstone");
                if tombstone || document.as_object().map_or(true, |o| o.is_empty()) {
                    return Err(ExecError::NotFound("tweet unavailable".to_string()));
                }
            }
            ApiCall::OEmbed => {}
        }
        Ok(ParsedContent::Json(document))
    }

    async fn release(&mut self) {}
}

/// Token the syndication endpoint expects: `(id / 1e15 * π)` in base 36
/// with zeros and the point removed
pub fn syndication_token(tweet_id: &str) -> String {
    let id: f64 = tweet_id.parse().unwrap_or(0.0);
    to_base36(id / 1e15 * std::f64::consts::PI).replace(['0', '.'], "")
}

fn to_base36(value: f64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut whole = value.trunc() as u64;
    let mut fraction = value.fract();

    let mut int_digits = Vec::new();
    loop {
        int_digits.push(DIGITS[(whole % 36) as usize] as char);
        whole /= 36;
        if whole == 0 {
            break;
        }
    }
    let mut out: String = int_digits.into_iter().rev().collect();

    if fraction > 0.0 {
        out.push('.');
        for _ in 0..12 {
            fraction *= 36.0;
            let digit = fraction.trunc() as usize;
            out.push(DIGITS[digit.min(35)] as char);
            fraction -= digit as f64;
            if fraction <= f64::EPSILON {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::domain::{ErrorKind, ExtractionAttempt, Field, Outcome};
    use crate::executor::run_strategy;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(base: &str, key: Option<&str>) -> PublicApiExecutor {
        PublicApiExecutor::new(&HttpSettings::default(), key.map(String::from), None)
            .unwrap()
            .with_endpoints(ApiEndpoints::all_at(base))
    }

    async fn run(executor: &PublicApiExecutor, target: &Target) -> ExtractionAttempt {
        run_strategy(
            executor,
            target,
            &ResolveHints::default(),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_youtube_video_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "dQw4w9WgXcQ"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "snippet": {
                        "title": "Rick Astley - Never Gonna Give You Up",
                        "publishedAt": "2009-10-25T06:57:33Z",
                        "channelTitle": "Rick Astley"
                    },
                    "statistics": {"viewCount": "1500000000", "likeCount": "18000000"},
                    "contentDetails": {"duration": "PT3M33S"}
                }]
            })))
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Some("test-key"));
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let attempt = run(&executor, &target).await;

        assert_eq!(attempt.outcome, Outcome::Success);
        assert_eq!(
            attempt.raw_fields.get(&Field::Duration).map(String::as_str),
            Some("PT3M33S")
        );
    }

    #[tokio::test]
    async fn test_youtube_empty_items_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Some("test-key"));
        let target = classify("https://www.youtube.com/watch?v=aaaaaaaaaaa").unwrap();
        assert_eq!(
            run(&executor, &target).await.error_kind(),
            Some(ErrorKind::NotFound)
        );
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_rate_limited_without_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#,
            ))
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Some("test-key"));
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let attempt = run(&executor, &target).await;
        assert_eq!(attempt.error_kind(), Some(ErrorKind::RateLimited));
        assert_eq!(attempt.error.and_then(|e| e.retry_after), None);
    }

    #[tokio::test]
    async fn test_missing_key_skips() {
        let executor = executor("http://127.0.0.1:9", None);
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let attempt = run(&executor, &target).await;
        assert_eq!(attempt.outcome, Outcome::Skipped);
        assert_eq!(
            attempt.skip_reason.as_deref(),
            Some("YouTube Data API key not configured")
        );
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_leak_keys() {
        // Nothing listens on the discard port.
        let executor = executor("http://127.0.0.1:9", Some("super-secret-key"));
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let attempt = run(&executor, &target).await;

        let error = attempt.error.expect("connection should fail");
        assert_eq!(error.kind, ErrorKind::TransientTransport);
        assert!(!error.message.contains("super-secret-key"));
    }

    #[tokio::test]
    async fn test_tweet_result_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tweet-result"))
            .and(query_param("id", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "just setting up my twttr",
                "favorite_count": 250000,
                "conversation_count": 18000,
                "user": {"screen_name": "jack"}
            })))
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), None);
        let target = classify("https://twitter.com/jack/status/20").unwrap();
        let attempt = run(&executor, &target).await;

        assert_eq!(attempt.outcome, Outcome::Success);
        assert_eq!(
            attempt.raw_fields.get(&Field::LikeCount).map(String::as_str),
            Some("250000")
        );
    }

    #[test]
    fn test_syndication_token_shape() {
        let token = syndication_token("1628832338187636740");
        assert!(!token.is_empty());
        assert!(!token.contains('0'));
        assert!(!token.contains('.'));
        assert_eq!(to_base36(35.0), "z");
        assert_eq!(to_base36(36.5), "10.i");
    }
}
