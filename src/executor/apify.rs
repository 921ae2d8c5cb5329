use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::{ContentType, Platform, ResolveHints, StrategyId, Target};
use crate::executor::settings::HttpSettings;
use crate::executor::{create_owned, ExecError, Executor, Mechanism, ParsedContent, Session};
use crate::extractor::{specs, FieldSpec};

pub const STRATEGY_ID: &str = "apify_actor";

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ids per platform and content kind
#[derive(Debug, Clone)]
pub struct ActorIds {
    pub instagram_post: String,
    pub instagram_profile: String,
    pub tiktok: String,
    pub twitter: String,
}

impl Default for ActorIds {
    fn default() -> Self {
        Self {
            instagram_post: "apify~instagram-scraper".to_string(),
            instagram_profile: "apify~instagram-profile-scraper".to_string(),
            tiktok: "clockworks~tiktok-scraper".to_string(),
            twitter: "apidojo~tweet-scraper".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RunData {
    id: String,
    status: String,
    #[serde(rename = "defaultDatasetId")]
    default_dataset_id: String,
}

/// Authenticated scraping actor (Apify).
///
/// A session starts one actor run, long-polls it to completion and reads
/// the first dataset item. Releasing a session whose run is still going
/// aborts the run so it stops consuming credits.
pub struct ApifyExecutor {
    client: Client,
    token: Option<String>,
    base_url: String,
    actors: ActorIds,
    wait_for_finish_secs: u64,
}

impl ApifyExecutor {
    pub fn new(settings: &HttpSettings, token: Option<String>) -> Result<Self, ExecError> {
        // Long polls hold the connection for up to a minute.
        let client = Client::builder()
            .timeout(settings.timeout() + Duration::from_secs(60))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
            base_url: BASE_URL.to_string(),
            actors: ActorIds::default(),
            wait_for_finish_secs: 60,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_actors(mut self, actors: ActorIds) -> Self {
        self.actors = actors;
        self
    }

    pub fn with_wait_for_finish(mut self, secs: u64) -> Self {
        self.wait_for_finish_secs = secs;
        self
    }

    /// Actor and run input for `target`
    fn run_input(&self, target: &Target, limit: usize) -> Option<(String, Value)> {
        use ContentType::*;

        let url = target.canonical_url();
        let owner = target.owner().unwrap_or_default().to_string();
        let input = match (target.platform(), target.content_type()) {
            (Platform::Instagram, Profile) => (
                self.actors.instagram_profile.clone(),
                json!({ "usernames": [owner] }),
            ),
            (Platform::Instagram, Video | Post) => (
                self.actors.instagram_post.clone(),
                json!({ "directUrls": [url], "resultsType": "posts", "resultsLimit": limit }),
            ),
            (Platform::TikTok, Profile) => (
                self.actors.tiktok.clone(),
                json!({ "profiles": [owner], "resultsPerPage": limit }),
            ),
            (Platform::TikTok, Video | Post) => (
                self.actors.tiktok.clone(),
                json!({ "postURLs": [url], "resultsPerPage": limit }),
            ),
            (Platform::Twitter, Profile) => (
                self.actors.twitter.clone(),
                json!({ "twitterHandles": [owner], "maxItems": limit }),
            ),
            (Platform::Twitter, Video | Post) => (
                self.actors.twitter.clone(),
                json!({ "startUrls": [url], "maxItems": limit }),
            ),
            _ => return None,
        };
        Some(input)
    }
}

#[async_trait]
impl Executor for ApifyExecutor {
    fn id(&self) -> StrategyId {
        StrategyId::new(STRATEGY_ID)
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::AuthenticatedActor
    }

    fn supports(&self, platform: Platform) -> bool {
        matches!(
            platform,
            Platform::Instagram | Platform::TikTok | Platform::Twitter
        )
    }

    fn skip_reason(&self, target: &Target) -> Option<String> {
        if !self.supports(target.platform()) {
            return Some(format!(
                "no actor configured for {}",
                target.platform().display_name()
            ));
        }
        if self.token.is_none() {
            return Some("actor token not configured".to_string());
        }
        if target.content_type() == ContentType::Hashtag {
            return Some("actor runs do not summarise hashtags".to_string());
        }
        None
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec> {
        specs::actor_specs(target)
    }

    async fn open(
        &self,
        target: &Target,
        hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| ExecError::Blocked("actor token not configured".to_string()))?;
        let limit = hints.item_limit();
        let (actor, input) = self.run_input(target, limit).ok_or_else(|| {
            ExecError::Malformed(format!("no actor input for {}", target.content_type()))
        })?;

        Ok(Box::new(ActorSession {
            client: self.client.clone(),
            token,
            base_url: self.base_url.clone(),
            actor,
            input,
            limit,
            wait_for_finish_secs: self.wait_for_finish_secs,
            run_id: None,
            finished: false,
        }))
    }
}

struct ActorSession {
    client: Client,
    token: String,
    base_url: String,
    actor: String,
    input: Value,
    limit: usize,
    wait_for_finish_secs: u64,
    run_id: Option<String>,
    finished: bool,
}

/// Handle for calls on runs that outlive one request
#[derive(Clone)]
struct RunControl {
    client: Client,
    token: String,
    base_url: String,
}

impl RunControl {
    async fn start(self, actor: String, input: Value) -> Result<RunData, ExecError> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;
        ExecError::check_response(&resp)?;

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    async fn abort(&self, run_id: &str) {
        let url = format!("{}/actor-runs/{}/abort", self.base_url, run_id);
        let aborted = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(Duration::from_secs(10))
            .send()
            .await;
        match aborted {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(run_id = %run_id, "Aborted unfinished actor run");
            }
            Ok(resp) => {
                tracing::warn!(run_id = %run_id, status = %resp.status(), "Actor run abort rejected");
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, "Failed to abort actor run: {}", e.without_url());
            }
        }
    }
}

impl ActorSession {
    fn control(&self) -> RunControl {
        RunControl {
            client: self.client.clone(),
            token: self.token.clone(),
            base_url: self.base_url.clone(),
        }
    }

    /// Start the run; a run created after the caller gave up is aborted
    async fn start_run(&self) -> Result<RunData, ExecError> {
        let control = self.control();
        let orphan_control = control.clone();
        create_owned(
            control.start(self.actor.clone(), self.input.clone()),
            move |started| async move {
                if let Ok(run) = started {
                    orphan_control.abort(&run.id).await;
                }
            },
        )
        .await
        .ok_or_else(|| ExecError::Transport("actor start task failed".to_string()))?
    }

    /// Poll until the run completes, using `waitForFinish` long-polling
    async fn wait_for_run(&self, run_id: &str) -> Result<RunData, ExecError> {
        loop {
            let url = format!(
                "{}/actor-runs/{}?waitForFinish={}",
                self.base_url, run_id, self.wait_for_finish_secs
            );
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            ExecError::check_response(&resp)?;

            let api_resp: ApiResponse<RunData> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ExecError::Transport(format!(
                        "actor run ended with status {}",
                        api_resp.data.status
                    )));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    if self.wait_for_finish_secs == 0 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }

    async fn first_item(&self, dataset_id: &str) -> Result<Value, ExecError> {
        let url = format!(
            "{}/datasets/{}/items?format=json&clean=true&limit={}",
            self.base_url, dataset_id, self.limit
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        ExecError::check_response(&resp)?;

        let items: Vec<Value> = resp.json().await?;
        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| ExecError::NotFound("actor returned no items".to_string()))?;

        if let Some(error) = item.get("error").and_then(Value::as_str) {
            return Err(ExecError::NotFound(format!("actor reported: {}", error)));
        }
        Ok(item)
    }
}

#[async_trait]
impl Session for ActorSession {
    async fn fetch(&mut self, _target: &Target) -> Result<ParsedContent, ExecError> {
        let run = self.start_run().await?;
        tracing::info!(run_id = %run.id, actor = %self.actor, "Actor run started, polling for completion");
        self.run_id = Some(run.id.clone());

        let completed = self.wait_for_run(&run.id).await?;
        self.finished = true;
        tracing::debug!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let item = self.first_item(&completed.default_dataset_id).await?;
        Ok(ParsedContent::Json(item))
    }

    async fn release(&mut self) {
        let Some(run_id) = self.run_id.take() else {
            return;
        };
        if self.finished {
            return;
        }
        self.control().abort(&run_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::domain::{ErrorKind, Field, Outcome};
    use crate::executor::run_strategy;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer, token: Option<&str>) -> ApifyExecutor {
        ApifyExecutor::new(&HttpSettings::default(), token.map(String::from))
            .unwrap()
            .with_base_url(&server.uri())
            .with_wait_for_finish(0)
    }

    fn run_body(status: &str) -> Value {
        json!({"data": {"id": "run1", "status": status, "defaultDatasetId": "ds1"}})
    }

    #[tokio::test]
    async fn test_actor_run_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acts/apify~instagram-scraper/runs"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(201).set_body_json(run_body("RUNNING")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("SUCCEEDED")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasets/ds1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "caption": "Golden hour #sunset",
                "likesCount": 1200,
                "commentsCount": 34,
                "ownerUsername": "natgeo",
                "videoPlayCount": 56000
            }])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/actor-runs/run1/abort"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let executor = executor(&server, Some("tok"));
        let target = classify("https://www.instagram.com/reel/C1a2B3c4D5e/").unwrap();
        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(attempt.outcome, Outcome::Success);
        assert_eq!(
            attempt.raw_fields.get(&Field::CreatorUsername).map(String::as_str),
            Some("natgeo")
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_is_aborted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acts/clockworks~tiktok-scraper/runs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(run_body("RUNNING")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(run_body("RUNNING"))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/actor-runs/run1/abort"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server, Some("tok"));
        let target =
            classify("https://www.tiktok.com/@scout2015/video/6718335390845095173").unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(20),
            &cancel,
        )
        .await;

        assert_eq!(attempt.error_kind(), Some(ErrorKind::Cancelled));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_run_created_after_cancel_is_aborted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acts/apidojo~tweet-scraper/runs"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(run_body("RUNNING"))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("RUNNING")))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/actor-runs/run1/abort"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server, Some("tok"));
        let target = classify("https://x.com/jack/status/20").unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(20),
            &cancel,
        )
        .await;
        assert_eq!(attempt.error_kind(), Some(ErrorKind::Cancelled));

        // The run only exists once the delayed start returns.
        tokio::time::sleep(Duration::from_millis(600)).await;
        server.verify().await;
    }

    #[test]
    fn test_skip_reasons() {
        let executor = ApifyExecutor::new(&HttpSettings::default(), None).unwrap();
        let reel = classify("https://www.instagram.com/reel/C1a2B3c4D5e/").unwrap();
        assert_eq!(
            executor.skip_reason(&reel).as_deref(),
            Some("actor token not configured")
        );

        let yt = classify("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert!(executor.skip_reason(&yt).unwrap().contains("YouTube"));
    }
}
