//! Icon URL resolution through an ordered chain of candidate sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::provider::{CoinDetail, ProviderError};

/// Answers "does this URL serve something". Never errors: a failed or slow
/// check is simply `false`.
#[async_trait]
pub trait ExistenceCheck: Send + Sync + 'static {
    async fn exists(&self, url: &str) -> bool;
}

/// HEAD-request existence check with a short timeout.
pub struct HttpExistenceCheck {
    http: reqwest::Client,
}

impl HttpExistenceCheck {
    pub fn new(timeout_ms: u64) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| ProviderError::ClientBuild(err.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ExistenceCheck for HttpExistenceCheck {
    async fn exists(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(
                    component = "image",
                    event = "image.check.failed",
                    url,
                    error = %err
                );
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    DetailLarge,
    DetailSmall,
    MarketInline,
    Probed,
    Unverified,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DetailLarge => "detail_large",
            Self::DetailSmall => "detail_small",
            Self::MarketInline => "market_inline",
            Self::Probed => "probed",
            Self::Unverified => "unverified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub url: String,
    pub source: ImageSource,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageQuery<'a> {
    pub external_id: &'a str,
    pub symbol: &'a str,
    pub detail: Option<&'a CoinDetail>,
    pub inline_image: Option<&'a str>,
}

pub struct ImageResolver {
    checker: Arc<dyn ExistenceCheck>,
}

impl ImageResolver {
    pub fn new(checker: Arc<dyn ExistenceCheck>) -> Self {
        Self { checker }
    }

    /// Full chain: payload images first, then probed candidates, then the
    /// unverified fallback. Always yields a URL.
    pub async fn resolve(&self, query: &ImageQuery<'_>) -> ResolvedImage {
        if let Some(found) = resolve_from_payloads(query) {
            return found;
        }

        for candidate in candidate_urls(query.external_id, query.symbol) {
            if self.checker.exists(&candidate).await {
                if let Some(url) = normalize_image_url(&candidate) {
                    return ResolvedImage {
                        url,
                        source: ImageSource::Probed,
                    };
                }
            }
        }

        debug!(
            component = "image",
            event = "image.fallback.unverified",
            external_id = query.external_id
        );
        ResolvedImage {
            url: fallback_url(query.symbol),
            source: ImageSource::Unverified,
        }
    }
}

/// Payload-only part of the chain; never touches the network.
pub fn resolve_from_payloads(query: &ImageQuery<'_>) -> Option<ResolvedImage> {
    let images = query.detail.and_then(|detail| detail.image.as_ref());
    let ordered = [
        (
            images.and_then(|set| set.large.as_deref()),
            ImageSource::DetailLarge,
        ),
        (
            images.and_then(|set| set.small.as_deref()),
            ImageSource::DetailSmall,
        ),
        (query.inline_image, ImageSource::MarketInline),
    ];

    ordered.into_iter().find_map(|(raw, source)| {
        raw.and_then(normalize_image_url)
            .map(|url| ResolvedImage { url, source })
    })
}

pub fn candidate_urls(external_id: &str, symbol: &str) -> Vec<String> {
    let id = external_id.trim().to_ascii_lowercase();
    let sym = symbol.trim().to_ascii_lowercase();
    vec![
        format!("https://assets.coingecko.com/coins/images/{id}/large/{id}.png"),
        format!("https://assets.coincap.io/assets/icons/{sym}@2x.png"),
        format!("https://cryptoicons.org/api/icon/{sym}/200"),
        format!(
            "https://raw.githubusercontent.com/spothq/cryptocurrency-icons/master/128/color/{sym}.png"
        ),
        format!("https://cryptologos.cc/logos/{id}-{sym}-logo.png"),
    ]
}

pub fn fallback_url(symbol: &str) -> String {
    let sym = sanitize_url(&symbol.trim().to_ascii_lowercase());
    format!("https://static.coincap.io/assets/icons/{sym}@2x.png")
}

/// Adds a scheme when missing and strips characters that are not legal in a URL.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.starts_with("//") {
        format!("https:{trimmed}")
    } else if has_foreign_scheme(trimmed) {
        return None;
    } else if !trimmed.contains("://") {
        format!("https://{}", trimmed.trim_start_matches('/'))
    } else {
        trimmed.to_string()
    };

    let sanitized = sanitize_url(&with_scheme);
    if sanitized.len() <= "https://".len() {
        None
    } else {
        Some(sanitized)
    }
}

// `data:`, `mailto:` and similar: a colon before the first slash that does
// not introduce a numeric port.
fn has_foreign_scheme(raw: &str) -> bool {
    if raw.contains("://") {
        return false;
    }
    let head = raw.split('/').next().unwrap_or(raw);
    match head.split_once(':') {
        Some((_, port)) => port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn sanitize_url(raw: &str) -> String {
    raw.chars().filter(|ch| is_url_char(*ch)).collect()
}

fn is_url_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '-' | '.'
                | '_'
                | '~'
                | ':'
                | '/'
                | '?'
                | '#'
                | '['
                | ']'
                | '@'
                | '!'
                | '$'
                | '&'
                | '\''
                | '('
                | ')'
                | '*'
                | '+'
                | ','
                | ';'
                | '='
                | '%'
        )
}
