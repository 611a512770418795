//! Raw fetch stage.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};

use super::Extractor;
use crate::core::{EntityId, RawPayload};
use crate::errors::ProviderError;
use crate::providers::{ProviderConfig, Scraper};

fn title_regex() -> Option<&'static Regex> {
    static TITLE: OnceLock<Option<Regex>> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"/w/([^?]+)").ok()).as_ref()
}

/// Splits a wiki page URL into `(name, variant)`.
///
/// `https://wiki/w/Hans#Ghost` gives `("Hans", Some("Ghost"))`. Underscores
/// in the title become spaces. Returns `None` if the URL has no `/w/` title.
#[must_use]
pub fn parse_page_title(page_url: &str) -> Option<(String, Option<String>)> {
    let title = title_regex()?.captures(page_url)?.get(1)?.as_str();
    let (name, variant) = match title.split_once('#') {
        Some((name, variant)) => (name, Some(variant)),
        None => (title, None),
    };

    let name = name.replace('_', " ").trim().to_string();
    if name.is_empty() {
        return None;
    }
    let variant = variant
        .map(|v| v.replace('_', " ").trim().to_string())
        .filter(|v| !v.is_empty());
    Some((name, variant))
}

/// Fetches the wiki page and normalizes it into a [`RawPayload`].
#[derive(Clone)]
pub struct RawExtractor {
    scraper: Arc<dyn Scraper>,
}

impl RawExtractor {
    /// Creates a raw extractor over `scraper`.
    #[must_use]
    pub fn new(scraper: Arc<dyn Scraper>) -> Self {
        Self { scraper }
    }
}

impl std::fmt::Debug for RawExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawExtractor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for RawExtractor {
    type Input = EntityId;
    type Output = RawPayload;

    async fn run(
        &self,
        entity_id: &EntityId,
        config: &ProviderConfig,
    ) -> Result<RawPayload, ProviderError> {
        let page = self.scraper.fetch(*entity_id, config).await?;

        if page.markdown.trim().is_empty() {
            return Err(ProviderError::fetch(format!(
                "empty page content at {}",
                page.page_url
            )));
        }

        let (name, variant) = parse_page_title(&page.page_url).ok_or_else(|| {
            ProviderError::fetch(format!("cannot parse page title from {}", page.page_url))
        })?;

        let checksum = hex::encode(Sha256::digest(page.markdown.as_bytes()));

        Ok(RawPayload {
            entity_id: *entity_id,
            name,
            variant,
            page_url: page.page_url,
            markdown: page.markdown,
            media_refs: page.media_refs,
            checksum,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::ScriptedScraper;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_title_with_variant() {
        assert_eq!(
            parse_page_title("https://oldschool.runescape.wiki/w/Hans#Ghost"),
            Some(("Hans".to_string(), Some("Ghost".to_string())))
        );
    }

    #[test]
    fn test_parse_title_without_variant() {
        assert_eq!(
            parse_page_title("https://oldschool.runescape.wiki/w/Father_Aereck"),
            Some(("Father Aereck".to_string(), None))
        );
    }

    #[test]
    fn test_parse_title_rejects_non_wiki_urls() {
        assert_eq!(parse_page_title("https://example.com/page"), None);
        assert_eq!(parse_page_title("https://example.com/w/#Variant"), None);
    }

    #[tokio::test]
    async fn test_raw_extractor_builds_payload() {
        let scraper = Arc::new(ScriptedScraper::new());
        scraper.push_page(
            EntityId::new(1),
            "https://wiki/w/Bob#Lumbridge",
            "Bob sells axes.",
            &["https://wiki/images/Bob.png"],
        );

        let extractor = RawExtractor::new(scraper);
        let payload = extractor
            .run(&EntityId::new(1), &ProviderConfig::default())
            .await
            .unwrap();

        assert_eq!(payload.name, "Bob");
        assert_eq!(payload.variant.as_deref(), Some("Lumbridge"));
        assert_eq!(payload.media_refs.len(), 1);
        assert_eq!(payload.checksum.len(), 64);
        assert_eq!(
            payload.checksum,
            hex::encode(Sha256::digest("Bob sells axes.".as_bytes()))
        );
    }

    #[tokio::test]
    async fn test_empty_markdown_is_fetch_error() {
        let scraper = Arc::new(ScriptedScraper::new());
        scraper.push_page(EntityId::new(2), "https://wiki/w/Empty", "   ", &[]);

        let err = RawExtractor::new(scraper)
            .run(&EntityId::new(2), &ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_found() {
        let scraper = Arc::new(ScriptedScraper::new());
        let err = RawExtractor::new(scraper)
            .run(&EntityId::new(404), &ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(id) if id == EntityId::new(404)));
    }
}
