// ABOUTME: Legacy XML selling API client for bulk engagement statistics
// ABOUTME: Parses the XML response into a typed map at the boundary; no markup escapes this module
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! Legacy bulk statistics.
//!
//! One XML-bodied `POST` per aggregation requests view/watch counters for
//! all listings at once. The response is parsed into
//! `HashMap<listing id, EngagementStats>` immediately; the rest of the
//! system never handles raw markup.

use std::collections::HashMap;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

use super::{classify_status, retry_after_hint};
use crate::errors::{AppError, AppResult};

/// Engagement counters for one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementStats {
    /// Total view count.
    pub view_count: u64,
    /// Current watcher count.
    pub watch_count: u64,
}

/// Fetch engagement counters for all listings in one batched call.
///
/// # Errors
///
/// Returns a classified error on transport or HTTP failure, or
/// `MarketplaceUnavailable` if the legacy API acknowledges the call as
/// failed or returns unparsable markup.
pub(crate) async fn fetch_bulk(
    http: &reqwest::Client,
    api_url: &str,
    token: String,
    listing_ids: &[String],
) -> AppResult<HashMap<String, EngagementStats>> {
    if listing_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let body = build_request(listing_ids);
    let response = http
        .post(api_url)
        .bearer_auth(token)
        .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .header("X-API-CALL-NAME", "GetListingStatistics")
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::unavailable(format!("Legacy API unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let mut err = classify_status(status, "Legacy statistics API");
        if let Some(delay) = retry_after_hint(&response) {
            err = err.with_retry_after(delay);
        }
        return Err(err);
    }

    let xml = response
        .text()
        .await
        .map_err(|e| AppError::unavailable(format!("Legacy API response unreadable: {e}")))?;

    parse_response(&xml)
}

/// Build the batched request body.
fn build_request(listing_ids: &[String]) -> String {
    let mut body = String::with_capacity(64 + listing_ids.len() * 32);
    body.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    body.push_str("<GetListingStatisticsRequest>");
    for id in listing_ids {
        body.push_str(&format!("<ListingId>{}</ListingId>", escape(id)));
    }
    body.push_str("</GetListingStatisticsRequest>");
    body
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Ack,
    Views,
    Watchers,
}

/// Parse the legacy response into a typed counter map.
///
/// Unknown elements are skipped; counters that fail to parse default to
/// zero rather than failing the batch.
fn parse_response(xml: &str) -> AppResult<HashMap<String, EngagementStats>> {
    let mut reader = Reader::from_str(xml);
    let mut stats = HashMap::new();
    let mut current_id: Option<String> = None;
    let mut current = EngagementStats::default();
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Listing" => {
                    current = EngagementStats::default();
                    current_id = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            let value = attr.unescape_value().map_err(|err| {
                                AppError::unavailable(format!(
                                    "Legacy API returned malformed listing id: {err}"
                                ))
                            })?;
                            current_id = Some(value.into_owned());
                        }
                    }
                }
                b"Ack" => field = Some(Field::Ack),
                b"Views" => field = Some(Field::Views),
                b"Watchers" => field = Some(Field::Watchers),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| {
                    AppError::unavailable(format!("Legacy API returned malformed text: {err}"))
                })?;
                let text = text.trim();
                match field {
                    Some(Field::Ack) => {
                        if !text.eq_ignore_ascii_case("success") {
                            return Err(AppError::unavailable(format!(
                                "Legacy API acknowledged the call as {text}"
                            )));
                        }
                    }
                    Some(Field::Views) => current.view_count = text.parse().unwrap_or(0),
                    Some(Field::Watchers) => current.watch_count = text.parse().unwrap_or(0),
                    None => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"Listing" {
                    if let Some(id) = current_id.take() {
                        stats.insert(id, current);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(AppError::unavailable(format!(
                    "Legacy API returned unparsable XML: {err}"
                )));
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn parses_counters_per_listing() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <GetListingStatisticsResponse>
                <Ack>Success</Ack>
                <Listing id="110011"><Views>42</Views><Watchers>7</Watchers></Listing>
                <Listing id="110022"><Views>3</Views><Watchers>0</Watchers></Listing>
            </GetListingStatisticsResponse>"#;

        let stats = parse_response(xml).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["110011"].view_count, 42);
        assert_eq!(stats["110011"].watch_count, 7);
        assert_eq!(stats["110022"].view_count, 3);
        assert_eq!(stats["110022"].watch_count, 0);
    }

    #[test]
    fn failure_ack_is_an_error() {
        let xml = "<GetListingStatisticsResponse><Ack>Failure</Ack></GetListingStatisticsResponse>";
        let err = parse_response(xml).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::MarketplaceUnavailable);
    }

    #[test]
    fn unknown_elements_and_bad_counters_are_tolerated() {
        let xml = r#"<Resp><Ack>Success</Ack>
            <Noise>ignored</Noise>
            <Listing id="1"><Views>not-a-number</Views><Watchers>5</Watchers><Extra>x</Extra></Listing>
        </Resp>"#;
        let stats = parse_response(xml).unwrap();
        assert_eq!(stats["1"].view_count, 0);
        assert_eq!(stats["1"].watch_count, 5);
    }

    #[test]
    fn listing_without_id_is_skipped() {
        let xml = "<Resp><Ack>Success</Ack><Listing><Views>9</Views></Listing></Resp>";
        assert!(parse_response(xml).unwrap().is_empty());
    }

    #[test]
    fn request_body_escapes_ids() {
        let body = build_request(&["1<2".to_owned()]);
        assert!(body.contains("<ListingId>1&lt;2</ListingId>"));
        assert!(body.starts_with("<?xml"));
    }
}
