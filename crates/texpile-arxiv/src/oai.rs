//! OAI-PMH `ListIdentifiers` harvesting
//!
//! Builds the [`MetadataIndex`] by following resumption tokens until the
//! listing is exhausted. Any unparseable page aborts the harvest: a partial
//! index would silently drop modern-era records.

use std::time::Duration;

use indicatif::ProgressBar;
use quick_xml::Reader;
use quick_xml::events::Event;
use texpile_core::{StreamError, fetch_text, is_shutdown_requested, retry_with_policy};

use crate::error::IngestError;
use crate::index::MetadataIndex;

/// One page of a `ListIdentifiers` response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Record ids (identifier suffix after the last `:`)
    pub ids: Vec<String>,
    /// Continuation token; `None` or empty ends pagination
    pub resumption_token: Option<String>,
}

/// Source of raw listing pages.
pub trait ListingTransport {
    /// Fetch the first page (`token == None`) or a continuation page.
    fn fetch_page(&self, token: Option<&str>) -> Result<String, StreamError>;
}

/// OAI-PMH endpoint over the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpListing {
    pub base_url: String,
    /// OAI set spec, e.g. `math`
    pub set: String,
    pub metadata_prefix: String,
}

impl HttpListing {
    pub fn new(base_url: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            set: set.into(),
            metadata_prefix: "oai_dc".to_string(),
        }
    }
}

impl ListingTransport for HttpListing {
    fn fetch_page(&self, token: Option<&str>) -> Result<String, StreamError> {
        match token {
            None => fetch_text(
                &self.base_url,
                &[
                    ("verb", "ListIdentifiers"),
                    ("set", &self.set),
                    ("metadataPrefix", &self.metadata_prefix),
                ],
            ),
            Some(token) => fetch_text(
                &self.base_url,
                &[("verb", "ListIdentifiers"), ("resumptionToken", token)],
            ),
        }
    }
}

/// Pacing for a harvest.
#[derive(Debug, Clone, Copy)]
pub struct HarvestOptions {
    /// Fixed pause before every continuation request
    pub page_delay: Duration,
    /// Retries per page on transient errors
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_base: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(5),
            max_retries: 5,
            retry_base: Duration::from_secs(10),
        }
    }
}

/// Harvest the full listing into a [`MetadataIndex`].
pub fn build_index(
    transport: &impl ListingTransport,
    opts: &HarvestOptions,
    pb: &ProgressBar,
) -> Result<MetadataIndex, IngestError> {
    let mut index = MetadataIndex::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if is_shutdown_requested() {
            return Err(IngestError::MetadataFetch(
                "interrupted before listing was complete".into(),
            ));
        }
        if pages > 0 {
            std::thread::sleep(opts.page_delay);
        }

        let label = format!("listing page {}", pages + 1);
        let body = retry_with_policy(
            &label,
            pb,
            opts.max_retries,
            |attempt| opts.retry_base * 2u32.saturating_pow(attempt - 1),
            || transport.fetch_page(token.as_deref()),
        )?;
        let page = parse_listing_page(&body)?;
        pages += 1;

        let page_len = page.ids.len();
        index.extend(page.ids);
        pb.set_message(format!("{pages} pages, {} ids", index.len()));
        log::debug!("{label}: {page_len} ids ({} unique so far)", index.len());

        match page.resumption_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    log::info!("Harvested {} record ids from {pages} pages", index.len());
    Ok(index)
}

/// The record id inside a namespaced OAI identifier.
///
/// `oai:arXiv.org:0704.0001` → `0704.0001`, `oai:arXiv.org:math/0601001` →
/// `math/0601001`.
pub fn record_id(identifier: &str) -> &str {
    identifier
        .rfind(':')
        .map_or(identifier, |pos| &identifier[pos + 1..])
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Identifier,
    Token,
    Error,
}

/// Parse one `ListIdentifiers` response body.
pub fn parse_listing_page(xml: &str) -> Result<ListingPage, IngestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListingPage::default();
    let mut saw_root = false;
    let mut in_header = false;
    let mut field: Option<Field> = None;
    let mut error_code: Option<String> = None;
    let mut error_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"OAI-PMH" => saw_root = true,
                b"header" => in_header = true,
                b"identifier" if in_header => field = Some(Field::Identifier),
                b"resumptionToken" => {
                    field = Some(Field::Token);
                    page.resumption_token = Some(String::new());
                }
                b"error" => {
                    field = Some(Field::Error);
                    error_code = Some(attr_value(&e, b"code").unwrap_or_default());
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                // `<resumptionToken completeListSize=".." cursor=".."/>` marks the last page
                b"resumptionToken" => page.resumption_token = None,
                b"error" => error_code = Some(attr_value(&e, b"code").unwrap_or_default()),
                _ => {}
            },
            Event::Text(t) => {
                let text = t.unescape()?;
                match field {
                    Some(Field::Identifier) => page.ids.push(record_id(text.trim()).to_string()),
                    Some(Field::Token) => page.resumption_token = Some(text.trim().to_string()),
                    Some(Field::Error) => error_text.push_str(&text),
                    None => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"header" => in_header = false,
                b"identifier" | b"resumptionToken" | b"error" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(IngestError::MetadataFetch(
            "response is not an OAI-PMH document".into(),
        ));
    }
    match error_code.as_deref() {
        None => {}
        // An empty set is a valid (empty) listing
        Some("noRecordsMatch") => return Ok(ListingPage::default()),
        Some(code) => {
            return Err(IngestError::MetadataFetch(format!(
                "OAI error {code}: {}",
                error_text.trim()
            )));
        }
    }
    Ok(page)
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn page(ids: &[&str], token: Option<&str>) -> String {
        let headers: String = ids
            .iter()
            .map(|id| {
                format!(
                    "<header><identifier>oai:arXiv.org:{id}</identifier>\
                     <datestamp>2010-01-04</datestamp><setSpec>math</setSpec></header>"
                )
            })
            .collect();
        let token = match token {
            Some(t) => format!(r#"<resumptionToken cursor="0" completeListSize="9">{t}</resumptionToken>"#),
            None => r#"<resumptionToken cursor="8" completeListSize="9"></resumptionToken>"#.to_string(),
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2022-03-01T00:00:00Z</responseDate>
<request verb="ListIdentifiers">http://export.arxiv.org/oai2</request>
<ListIdentifiers>{headers}{token}</ListIdentifiers>
</OAI-PMH>"#
        )
    }

    /// Serves scripted pages and records the tokens it was asked for.
    struct ScriptedListing {
        pages: RefCell<VecDeque<Result<String, StreamError>>>,
        tokens: RefCell<Vec<Option<String>>>,
    }

    impl ScriptedListing {
        fn new(pages: Vec<Result<String, StreamError>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                tokens: RefCell::new(Vec::new()),
            }
        }
    }

    impl ListingTransport for ScriptedListing {
        fn fetch_page(&self, token: Option<&str>) -> Result<String, StreamError> {
            self.tokens.borrow_mut().push(token.map(String::from));
            self.pages
                .borrow_mut()
                .pop_front()
                .expect("harvest asked for more pages than scripted")
        }
    }

    fn fast() -> HarvestOptions {
        HarvestOptions {
            page_delay: Duration::ZERO,
            max_retries: 2,
            retry_base: Duration::ZERO,
        }
    }

    #[test]
    fn record_id_takes_last_segment() {
        assert_eq!(record_id("oai:arXiv.org:0704.0001"), "0704.0001");
        assert_eq!(record_id("oai:arXiv.org:math/0601001"), "math/0601001");
        assert_eq!(record_id("bare"), "bare");
    }

    #[test]
    fn parse_page_with_token() {
        let parsed = parse_listing_page(&page(&["0704.0001", "0704.0002"], Some("123|1001"))).unwrap();
        assert_eq!(parsed.ids, vec!["0704.0001", "0704.0002"]);
        assert_eq!(parsed.resumption_token.as_deref(), Some("123|1001"));
    }

    #[test]
    fn parse_last_page_has_empty_token() {
        let parsed = parse_listing_page(&page(&["1001.0001"], None)).unwrap();
        assert_eq!(parsed.resumption_token.as_deref(), Some(""));
    }

    #[test]
    fn parse_self_closing_token_ends_listing() {
        let xml = r#"<OAI-PMH><ListIdentifiers><header><identifier>oai:arXiv.org:1</identifier></header>
<resumptionToken cursor="1" completeListSize="1"/></ListIdentifiers></OAI-PMH>"#;
        let parsed = parse_listing_page(xml).unwrap();
        assert_eq!(parsed.ids, vec!["1"]);
        assert_eq!(parsed.resumption_token, None);
    }

    #[test]
    fn parse_rejects_non_oai() {
        let err = parse_listing_page("<html><body>Service unavailable</body></html>").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_listing_page("<OAI-PMH><ListIdentifiers></Wrong>").is_err());
    }

    #[test]
    fn parse_oai_error_is_fatal() {
        let xml = r#"<OAI-PMH><error code="badResumptionToken">expired</error></OAI-PMH>"#;
        let err = parse_listing_page(xml).unwrap_err();
        assert!(err.to_string().contains("badResumptionToken"));
    }

    #[test]
    fn parse_no_records_match_is_empty() {
        let xml = r#"<OAI-PMH><error code="noRecordsMatch">none</error></OAI-PMH>"#;
        assert_eq!(parse_listing_page(xml).unwrap(), ListingPage::default());
    }

    #[test]
    fn build_follows_tokens_and_dedups() {
        let transport = ScriptedListing::new(vec![
            Ok(page(&["a", "b"], Some("t1"))),
            Ok(page(&["b", "c"], Some("t2"))),
            Ok(page(&["d"], None)),
        ]);
        let index = build_index(&transport, &fast(), &ProgressBar::hidden()).unwrap();

        assert_eq!(index.len(), 4);
        for id in ["a", "b", "c", "d"] {
            assert!(index.contains(id));
        }
        assert_eq!(
            *transport.tokens.borrow(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[test]
    fn build_retries_transient_errors() {
        let transport = ScriptedListing::new(vec![
            Err(StreamError::Http {
                status: Some(503),
                message: "retry later".into(),
            }),
            Ok(page(&["x"], None)),
        ]);
        let index = build_index(&transport, &fast(), &ProgressBar::hidden()).unwrap();
        assert!(index.contains("x"));
    }

    #[test]
    fn build_aborts_on_unparseable_page() {
        let transport = ScriptedListing::new(vec![
            Ok(page(&["a"], Some("t1"))),
            Ok("not xml at all".to_string()),
        ]);
        let err = build_index(&transport, &fast(), &ProgressBar::hidden()).unwrap_err();
        assert!(err.is_fatal());
    }
}
