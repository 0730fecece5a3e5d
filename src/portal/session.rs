//! Upstream HTTP session handling.
//!
//! A [`PortalSession`] owns one cookie jar, so it maps onto exactly one
//! server-side ASP.NET session. Sessions are cheap and never shared between
//! concurrent callers; open a new one per request via [`Portal::open_session`].

use std::future::Future;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, trace, warn};
use url::Url;

use crate::portal::errors::PortalError;
use crate::portal::form::FormFields;

/// Page holding the building/floor/room dropdown cascade.
pub const ENTRY_PAGE: &str = "default.aspx";
/// Page holding the usage-record table and pager.
pub const RESULTS_PAGE: &str = "usedRecord.aspx";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3";

/// Knobs for talking to the portal.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub base_url: String,
    /// Politeness delay slept before every request.
    pub request_delay: Duration,
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Attempts for idempotent page loads (entry page, result pages).
    pub entry_retries: u32,
}

impl PortalSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
            entry_retries: 3,
        }
    }
}

/// Factory for [`PortalSession`]s, holding the resolved portal URLs.
#[derive(Debug, Clone)]
pub struct Portal {
    settings: PortalSettings,
    base_url: Url,
    entry_url: Url,
    results_url: Url,
}

impl Portal {
    pub fn new(settings: PortalSettings) -> Result<Self, PortalError> {
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let entry_url = base_url.join(ENTRY_PAGE)?;
        let results_url = base_url.join(RESULTS_PAGE)?;

        Ok(Self {
            settings,
            base_url,
            entry_url,
            results_url,
        })
    }

    pub fn entry_url(&self) -> &Url {
        &self.entry_url
    }

    pub fn results_url(&self) -> &Url {
        &self.results_url
    }

    /// Start a fresh upstream session with its own cookie jar.
    pub fn open_session(&self) -> Result<PortalSession, PortalError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        if let Ok(origin) = HeaderValue::from_str(&self.base_url.origin().ascii_serialization()) {
            headers.insert(header::ORIGIN, origin);
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(self.settings.request_timeout)
            .build()?;

        trace!(base_url = %self.base_url, "opened portal session");

        Ok(PortalSession {
            http,
            entry_url: self.entry_url.clone(),
            results_url: self.results_url.clone(),
            delay: self.settings.request_delay,
            retries: self.settings.entry_retries.max(1),
        })
    }
}

/// Hidden form state returned by the most recent response.
///
/// The portal rejects a submission unless it echoes the hidden fields of the
/// page immediately before it, so each cascade step consumes one of these and
/// produces the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    fields: FormFields,
}

impl SessionState {
    pub fn new(fields: FormFields) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    /// Build POST params: all hidden fields, then `__EVENTTARGET` and overrides.
    ///
    /// `event_target: None` removes `__EVENTTARGET` entirely, which is how a
    /// button click (rather than a dropdown change) is submitted.
    pub(crate) fn postback(
        &self,
        event_target: Option<&str>,
        overrides: &[(&str, &str)],
    ) -> Vec<(String, String)> {
        let mut fields = self.fields.clone();
        match event_target {
            Some(target) => fields.insert("__EVENTTARGET", target),
            None => fields.remove("__EVENTTARGET"),
        }
        for &(name, value) in overrides {
            fields.insert(name, value);
        }
        fields.into_pairs()
    }
}

/// One upstream session: a cookie-carrying client plus pacing settings.
pub struct PortalSession {
    http: reqwest::Client,
    pub(crate) entry_url: Url,
    pub(crate) results_url: Url,
    delay: Duration,
    retries: u32,
}

impl PortalSession {
    /// Sleep the politeness delay, scaled by `factor`.
    pub(crate) async fn pause(&self, factor: u32) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay * factor).await;
        }
    }

    pub(crate) async fn get(&self, url: &Url, referer: Option<&Url>) -> Result<String, PortalError> {
        let mut req = self.http.get(url.clone());
        if let Some(referer) = referer {
            req = req.header(header::REFERER, referer.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| PortalError::from_send(e, url))?;
        Self::read_body(resp, url).await
    }

    pub(crate) async fn post_form(
        &self,
        url: &Url,
        referer: Option<&Url>,
        params: &[(String, String)],
    ) -> Result<String, PortalError> {
        let mut req = self.http.post(url.clone()).form(params);
        if let Some(referer) = referer {
            req = req.header(header::REFERER, referer.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| PortalError::from_send(e, url))?;
        Self::read_body(resp, url).await
    }

    async fn read_body(resp: reqwest::Response, url: &Url) -> Result<String, PortalError> {
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "portal response");
        if !status.is_success() {
            return Err(PortalError::Status {
                status,
                url: url.to_string(),
            });
        }
        resp.text().await.map_err(|e| PortalError::from_send(e, url))
    }

    /// Run an idempotent operation, retrying transient failures.
    ///
    /// Attempt `n` is preceded by a sleep of `n × request_delay`.
    pub(crate) async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PortalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortalError>>,
    {
        let mut attempt = 1;
        loop {
            self.pause(attempt).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.retries,
                        error = %e,
                        "transient portal failure, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
