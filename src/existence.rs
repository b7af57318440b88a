//! Checking whether a COG was already published.
//!
//! A check location is a local directory or an http(s) URL prefix. Local locations are
//! checked with the filesystem, remote ones with a `HEAD` request. A missing file or a 404
//! response means "does not exist"; every other failure is reported as an error.
use std::path::Path;
use std::time::Duration;

use error_stack::ResultExt;
use reqwest::StatusCode;

use crate::hrefs::{join_href, remote_url};

pub type ExistenceResult<T> = error_stack::Result<T, ExistenceError>;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ExistenceError {
    #[error("Request to check for {0} failed")]
    Transport(String),
    #[error("Checking for {href} returned unexpected HTTP status {status}")]
    UnexpectedStatus { href: String, status: u16 },
    #[error("Could not check for local file {0}")]
    Io(String),
    #[error("Cannot check for {0}: only local paths and http(s) URLs are supported")]
    UnsupportedScheme(String),
    #[error("Could not build the HTTP client")]
    Client,
}

/// Rewrites an HREF before it is read or checked, e.g. to add an access token.
pub trait HrefModifier {
    fn modify(&self, href: &str) -> String;
}

impl<F: Fn(&str) -> String> HrefModifier for F {
    fn modify(&self, href: &str) -> String {
        self(href)
    }
}

/// Appends a query-string token (such as a SAS token) to remote HREFs.
/// Local paths are left alone.
#[derive(Debug, Clone)]
pub struct QueryTokenModifier {
    token: String,
}

impl QueryTokenModifier {
    pub fn new(token: &str) -> Self {
        Self { token: token.trim_start_matches('?').to_string() }
    }
}

impl HrefModifier for QueryTokenModifier {
    fn modify(&self, href: &str) -> String {
        match remote_url(href) {
            Some(mut url) if !self.token.is_empty() => {
                url.query_pairs_mut()
                    .extend_pairs(url::form_urlencoded::parse(self.token.as_bytes()));
                url.to_string()
            }
            _ => href.to_string(),
        }
    }
}

/// Checks local paths and remote URLs for existence.
pub struct ExistenceChecker {
    client: reqwest::blocking::Client,
}

impl ExistenceChecker {
    pub fn new(timeout: Duration) -> ExistenceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(ExistenceError::Client)?;
        Ok(Self { client })
    }

    /// Does `href` exist? `modifier`, if given, is applied to remote HREFs before probing;
    /// errors always name the unmodified HREF.
    pub fn exists(&self, href: &str, modifier: Option<&dyn HrefModifier>) -> ExistenceResult<bool> {
        let Some(url) = remote_url(href) else {
            return Path::new(href).try_exists()
                .change_context_lazy(|| ExistenceError::Io(href.to_string()));
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExistenceError::UnsupportedScheme(href.to_string()).into());
        }

        let request_href = match modifier {
            Some(m) => m.modify(href),
            None => href.to_string(),
        };
        let resp = self.client.head(&request_href)
            .send()
            .change_context_lazy(|| ExistenceError::Transport(href.to_string()))?;

        let status = resp.status();
        log::debug!("HEAD {href} -> {status}");
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(ExistenceError::UnexpectedStatus { href: href.to_string(), status: status.as_u16() }.into())
        }
    }

    /// If a file named `filename` exists under `check_dir`, return its HREF.
    pub fn existing_href(&self, check_dir: &str, filename: &str, modifier: Option<&dyn HrefModifier>) -> ExistenceResult<Option<String>> {
        let href = join_href(check_dir, filename);
        if self.exists(&href, modifier)? {
            Ok(Some(href))
        } else {
            Ok(None)
        }
    }
}
