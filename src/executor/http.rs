use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use url::Url;

use crate::domain::{Platform, ResolveHints, StrategyId, Target};
use crate::executor::settings::HttpSettings;
use crate::executor::{is_login_url, ExecError, Executor, Mechanism, ParsedContent, Session};
use crate::extractor::{specs, FieldSpec};

pub const STRATEGY_ID: &str = "http_html";

/// Plain HTTP GET of the canonical page; scripts are not run
pub struct HttpHtmlExecutor {
    client: Client,
    base_url: Option<Url>,
}

impl HttpHtmlExecutor {
    pub fn new(settings: &HttpSettings) -> Result<Self, ExecError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(settings.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Send requests to `base` instead of the platform host, keeping path and query
    pub fn with_base_url(mut self, base: &str) -> Result<Self, ExecError> {
        let base = Url::parse(base).map_err(|e| ExecError::Malformed(e.to_string()))?;
        self.base_url = Some(base);
        Ok(self)
    }

    fn page_url(&self, target: &Target) -> Result<Url, ExecError> {
        let canonical =
            Url::parse(&target.canonical_url()).map_err(|e| ExecError::Malformed(e.to_string()))?;
        match self.base_url {
            Some(ref base) => {
                let mut url = base.join(canonical.path()).map_err(|e| ExecError::Malformed(e.to_string()))?;
                url.set_query(canonical.query());
                Ok(url)
            }
            None => Ok(canonical),
        }
    }
}

#[async_trait]
impl Executor for HttpHtmlExecutor {
    fn id(&self) -> StrategyId {
        StrategyId::new(STRATEGY_ID)
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::Http
    }

    fn supports(&self, platform: Platform) -> bool {
        platform != Platform::Unknown
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec> {
        specs::html_specs(target)
    }

    async fn open(
        &self,
        target: &Target,
        _hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            url: self.page_url(target)?,
        }))
    }
}

struct HttpSession {
    client: Client,
    url: Url,
}

#[async_trait]
impl Session for HttpSession {
    async fn fetch(&mut self, target: &Target) -> Result<ParsedContent, ExecError> {
        let response = self.client.get(self.url.clone()).send().await?;
        ExecError::check_response(&response)?;

        if is_login_url(response.url().path()) {
            return Err(ExecError::Blocked(format!(
                "{} redirected to a login page",
                target.platform().display_name()
            )));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(ExecError::Malformed("Empty response body".to_string()));
        }
        Ok(ParsedContent::Html(body))
    }

    async fn release(&mut self) {
        // Connection goes back to the client's pool.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::domain::{ErrorKind, Field, Outcome};
    use crate::executor::run_strategy;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WATCH_PAGE: &str = r#"<html><head>
        <meta property="og:title" content="Never Gonna Give You Up">
        <meta itemprop="interactionCount" content="1500000000">
        <meta itemprop="uploadDate" content="2009-10-25">
        </head><body><script>
        var ytInitialPlayerResponse = {"videoDetails":{"lengthSeconds":"213","ownerChannelName":"Rick Astley"}};
        var label = "like this video along with 18,000,000 other people";
        </script></body></html>"#;

    async fn executor_for(server: &MockServer) -> HttpHtmlExecutor {
        HttpHtmlExecutor::new(&HttpSettings::default())
            .unwrap()
            .with_base_url(&server.uri())
            .unwrap()
    }

    async fn run(executor: &HttpHtmlExecutor, target: &Target) -> crate::domain::ExtractionAttempt {
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
    async fn test_watch_page_resolves_all_required_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", "dQw4w9WgXcQ"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WATCH_PAGE))
            .mount(&server)
            .await;

        let executor = executor_for(&server).await;
        let target = classify("https://youtu.be/dQw4w9WgXcQ").unwrap();
        let attempt = run(&executor, &target).await;

        assert_eq!(attempt.outcome, Outcome::Success);
        assert_eq!(
            attempt.raw_fields.get(&Field::Title).map(String::as_str),
            Some("Never Gonna Give You Up")
        );
        assert_eq!(
            attempt.raw_fields.get(&Field::CreatorUsername).map(String::as_str),
            Some("Rick Astley")
        );
        assert_eq!(
            attempt.raw_fields.get(&Field::Duration).map(String::as_str),
            Some("213")
        );
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/@gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/@busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/@flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let executor = executor_for(&server).await;

        let gone = run(&executor, &classify("https://www.tiktok.com/@gone").unwrap()).await;
        assert_eq!(gone.error_kind(), Some(ErrorKind::NotFound));

        let busy = run(&executor, &classify("https://www.tiktok.com/@busy").unwrap()).await;
        assert_eq!(busy.error_kind(), Some(ErrorKind::RateLimited));
        assert_eq!(
            busy.error.as_ref().and_then(|e| e.retry_after),
            Some(Duration::from_secs(7))
        );

        let flaky = run(&executor, &classify("https://www.tiktok.com/@flaky").unwrap()).await;
        assert_eq!(flaky.error_kind(), Some(ErrorKind::TransientTransport));
    }

    #[tokio::test]
    async fn test_captcha_page_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/natgeo/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><body><div class="g-recaptcha"></div></body></html>"#),
            )
            .mount(&server)
            .await;

        let executor = executor_for(&server).await;
        let attempt = run(&executor, &classify("instagram.com/natgeo").unwrap()).await;
        assert_eq!(attempt.error_kind(), Some(ErrorKind::Blocked));
    }
}
