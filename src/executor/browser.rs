use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};

use crate::domain::{Platform, ResolveHints, StrategyId, Target};
use crate::executor::settings::BrowserSettings;
use crate::executor::{
    create_owned, is_login_url, ExecError, Executor, Mechanism, ParsedContent, Session,
};
use crate::extractor::{specs, FieldSpec};

pub const STRATEGY_ID: &str = "browser_dom";

/// Snapshot of the rendered document after scripts ran
const SNAPSHOT_SCRIPT: &str = r#"
    (() => {
        window.scrollTo(0, Math.min(document.body ? document.body.scrollHeight : 0, 1200));
        return {
            html: document.documentElement ? document.documentElement.outerHTML : '',
            url: location.href
        };
    })()
"#;

/// Headless Chrome executor using chromiumoxide.
///
/// One browser is launched on first use and shared; every attempt gets its
/// own page, closed when the session is released.
pub struct BrowserExecutor {
    settings: BrowserSettings,
    browser: OnceCell<Result<Arc<Browser>, String>>,
    pages: Arc<Semaphore>,
}

impl BrowserExecutor {
    pub fn new(settings: BrowserSettings) -> Self {
        let pages = Arc::new(Semaphore::new(settings.max_pages.max(1)));
        Self {
            settings,
            browser: OnceCell::new(),
            pages,
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, ExecError> {
        let launched = self
            .browser
            .get_or_init(|| async {
                launch(&self.settings)
                    .await
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .await;

        match launched {
            Ok(browser) => Ok(browser.clone()),
            Err(e) => Err(ExecError::Blocked(format!("browser unavailable: {}", e))),
        }
    }
}

async fn launch(settings: &BrowserSettings) -> Result<Browser, ExecError> {
    let mut builder = BrowserConfig::builder()
        .arg("--no-sandbox")
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-software-rasterizer")
        .arg("--disable-blink-features=AutomationControlled")
        .request_timeout(settings.timeout());

    if !settings.headless {
        builder = builder.with_head();
    }

    let browser_config = builder
        .build()
        .map_err(|e| ExecError::Transport(format!("Failed to build browser config: {}", e)))?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        ExecError::Transport(format!(
            "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
            e
        ))
    })?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("Browser handler error: {}", e);
            }
        }
    });

    tracing::info!("Launched headless browser");
    Ok(browser)
}

#[async_trait]
impl Executor for BrowserExecutor {
    fn id(&self) -> StrategyId {
        StrategyId::new(STRATEGY_ID)
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::Browser
    }

    fn supports(&self, platform: Platform) -> bool {
        platform != Platform::Unknown
    }

    fn skip_reason(&self, target: &Target) -> Option<String> {
        if !self.supports(target.platform()) {
            return Some(format!("{} does not handle unknown platforms", STRATEGY_ID));
        }
        match self.browser.get() {
            Some(Err(e)) => Some(format!("browser unavailable: {}", e)),
            _ => None,
        }
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec> {
        specs::browser_specs(target)
    }

    async fn open(
        &self,
        _target: &Target,
        _hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError> {
        let permit = self
            .pages
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExecError::Transport(format!("Semaphore error: {}", e)))?;
        let browser = self.browser().await?;

        // The tab belongs to the session before any navigation starts, so
        // release can always close it.
        let created = create_owned(
            async move { browser.new_page("about:blank").await },
            |created| async move {
                if let Ok(page) = created {
                    if let Err(e) = page.close().await {
                        tracing::warn!("Failed to close abandoned page: {}", e);
                    }
                }
            },
        )
        .await
        .ok_or_else(|| ExecError::Transport("page creation task failed".to_string()))?;
        let page = created.map_err(cdp("Failed to create page"))?;

        Ok(Box::new(BrowserSession {
            settings: self.settings.clone(),
            page: Some(page),
            permit: Some(permit),
        }))
    }
}

struct BrowserSession {
    settings: BrowserSettings,
    page: Option<Page>,
    permit: Option<OwnedSemaphorePermit>,
}

fn cdp<E: Display>(what: &'static str) -> impl FnOnce(E) -> ExecError {
    move |e| ExecError::Transport(format!("{}: {}", what, e))
}

#[async_trait]
impl Session for BrowserSession {
    async fn fetch(&mut self, target: &Target) -> Result<ParsedContent, ExecError> {
        let page = self
            .page
            .clone()
            .ok_or_else(|| ExecError::Transport("session page already closed".to_string()))?;

        if let Some(ref ua) = self.settings.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(cdp("Failed to set user agent"))?;
        }

        page.goto(target.canonical_url())
            .await
            .map_err(cdp("Navigation failed"))?;
        page.wait_for_navigation()
            .await
            .map_err(cdp("Navigation failed"))?;

        // Additional wait for client-side rendering
        tokio::time::sleep(self.settings.wait_after_load()).await;

        let snapshot: serde_json::Value = page
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(cdp("Script execution failed"))?
            .into_value()
            .map_err(|e| ExecError::Malformed(format!("Failed to parse snapshot: {:?}", e)))?;

        let url = snapshot["url"].as_str().unwrap_or_default();
        if is_login_url(url) {
            return Err(ExecError::Blocked(format!(
                "{} redirected to a login page",
                target.platform().display_name()
            )));
        }

        let html = snapshot["html"].as_str().unwrap_or_default();
        if html.trim().is_empty() {
            return Err(ExecError::Malformed("No content rendered".to_string()));
        }
        Ok(ParsedContent::Html(html.to_string()))
    }

    async fn release(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!("Failed to close page: {}", e);
            }
        }
        self.permit.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    #[test]
    fn test_browser_executor_identity() {
        let executor = BrowserExecutor::new(BrowserSettings::default());
        assert_eq!(executor.id().as_str(), "browser_dom");
        assert_eq!(executor.mechanism(), Mechanism::Browser);
        assert!(executor.supports(Platform::Instagram));
        assert!(!executor.supports(Platform::Unknown));
    }

    #[test]
    fn test_no_skip_before_launch() {
        let executor = BrowserExecutor::new(BrowserSettings::default());
        let target = classify("https://www.tiktok.com/@scout2015/video/6718335390845095173").unwrap();
        assert_eq!(executor.skip_reason(&target), None);
        assert!(!executor.field_specs(&target).is_empty());
    }
}
