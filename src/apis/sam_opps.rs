use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::apis::text_at;
use crate::constants::{SAM_GOV_MOCK_SOURCE, SAM_GOV_SOURCE};
use crate::error::{DataForgeError, Result};
use crate::types::{raw_record, RawRecord, RecordKind, SourceConnector, SourceQuery};

const SAM_ENDPOINT: &str = "https://api.sam.gov/opportunities/v1/search";
const MAX_PER_PAGE: usize = 1000;
const DEFAULT_WINDOW_DAYS: u64 = 30;
const MOCK_RECORDS: usize = 10;

/// SAM.gov contract opportunities. Without an API key it serves a small,
/// deterministic set of mock notices so the RFP flow can be exercised offline.
pub struct SamOpportunitiesConnector {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl SamOpportunitiesConnector {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, SAM_ENDPOINT)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("SAM.gov API key not set, connector will return mock data");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.to_string(),
        })
    }

    /// Search parameters except paging. The posted window defaults to the
    /// last 30 days when either bound is missing.
    fn search_params(query: &SourceQuery, today: NaiveDate) -> Vec<(&'static str, String)> {
        let (from, to) = match (query.posted_from, query.posted_to) {
            (Some(from), Some(to)) => (from, to),
            _ => (
                today
                    .checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS))
                    .unwrap_or(today),
                today,
            ),
        };

        let mut params = vec![
            ("postedFrom", from.format("%m/%d/%Y").to_string()),
            ("postedTo", to.format("%m/%d/%Y").to_string()),
            ("noticeType", "Solicitation".to_string()),
        ];
        if !query.naics.is_empty() {
            params.push(("ncode", query.naics.join(",")));
        }
        if !query.states.is_empty() {
            params.push(("placeOfPerformance.state", query.states.join(",")));
        }
        if !query.keywords.is_empty() {
            params.push(("q", query.keywords.join(" ")));
        }
        params
    }

    async fn fetch_page(&self, api_key: &str, params: &[(&'static str, String)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.base_url)
            .header("X-API-KEY", api_key)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Ok(body
            .get("opportunitiesData")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Map one opportunity to the solicitation raw-record shape.
pub fn opportunity_to_raw(opportunity: &Value) -> Option<RawRecord> {
    let notice_id = text_at(opportunity, "/noticeId")?;
    let estimated_value = opportunity
        .pointer("/award/awardAmount")
        .filter(|v| v.is_number() || v.is_string())
        .cloned()
        .unwrap_or(Value::Null);

    Some(raw_record(json!({
        "notice_id": notice_id,
        "title": text_at(opportunity, "/title"),
        "agency": text_at(opportunity, "/department/name")
            .or_else(|| text_at(opportunity, "/fullParentPathName")),
        "naics": text_at(opportunity, "/naicsCode/code")
            .or_else(|| text_at(opportunity, "/naicsCode")),
        "solicitation_number": text_at(opportunity, "/solicitationNumber"),
        "notice_type": text_at(opportunity, "/noticeType")
            .or_else(|| text_at(opportunity, "/type")),
        "posted_date": text_at(opportunity, "/postedDate"),
        "close_date": text_at(opportunity, "/responseDeadline")
            .or_else(|| text_at(opportunity, "/responseDeadLine")),
        "place_of_performance_state": text_at(opportunity, "/placeOfPerformance/state")
            .or_else(|| text_at(opportunity, "/placeOfPerformance/state/code")),
        "description": text_at(opportunity, "/description"),
        "url": text_at(opportunity, "/uiLink"),
        "contact_name": text_at(opportunity, "/pointOfContact/fullName")
            .or_else(|| text_at(opportunity, "/pointOfContact/0/fullName")),
        "contact_email": text_at(opportunity, "/pointOfContact/email")
            .or_else(|| text_at(opportunity, "/pointOfContact/0/email")),
        "estimated_value": estimated_value,
        "source": SAM_GOV_SOURCE,
    })))
}

/// Up to ten mock notices cycling through the requested states and NAICS codes.
pub fn mock_opportunities(query: &SourceQuery, today: NaiveDate) -> Vec<RawRecord> {
    let topic = query.keywords.first().map(String::as_str).unwrap_or("Telehealth");
    (0..query.limit.min(MOCK_RECORDS))
        .map(|i| {
            let n = i + 1;
            let state = if query.states.is_empty() {
                "DC"
            } else {
                query.states[i % query.states.len()].as_str()
            };
            let naics = if query.naics.is_empty() {
                "541511"
            } else {
                query.naics[i % query.naics.len()].as_str()
            };
            let posted = today.checked_sub_days(Days::new(i as u64)).unwrap_or(today);
            let close = today
                .checked_add_days(Days::new(14 - i as u64))
                .unwrap_or(today);

            raw_record(json!({
                "notice_id": format!("mock-{n:03}"),
                "title": format!("Mock {topic} Services - {state}"),
                "agency": format!("Mock Agency {n}"),
                "naics": naics,
                "solicitation_number": format!("MOCK-{n:04}"),
                "notice_type": "Solicitation",
                "posted_date": posted.to_string(),
                "close_date": close.to_string(),
                "place_of_performance_state": state,
                "description": format!("Mock opportunity for {} services in {state}", topic.to_lowercase()),
                "url": format!("https://sam.gov/opp/mock-{n:03}"),
                "contact_name": format!("Mock Officer {n}"),
                "contact_email": format!("mock{n}@example.com"),
                "estimated_value": 100_000 + i * 50_000,
                "source": SAM_GOV_MOCK_SOURCE,
            }))
        })
        .collect()
}

#[async_trait]
impl SourceConnector for SamOpportunitiesConnector {
    fn source_id(&self) -> &'static str {
        SAM_GOV_SOURCE
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Rfp
    }

    #[instrument(skip(self, query), fields(states = ?query.states))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>> {
        let today = Utc::now().date_naive();
        let Some(api_key) = self.api_key.as_deref() else {
            info!("SAM.gov API key not available, returning mock data");
            return Ok(mock_opportunities(query, today));
        };

        let base = Self::search_params(query, today);
        let mut records: Vec<RawRecord> = Vec::new();
        while records.len() < query.limit {
            let mut params = base.clone();
            params.push(("limit", MAX_PER_PAGE.min(query.limit - records.len()).to_string()));
            params.push(("offset", records.len().to_string()));
            debug!(offset = records.len(), "SAM.gov search page");

            let page = match self.fetch_page(api_key, &params).await {
                Ok(page) => page,
                Err(e) if records.is_empty() => {
                    return Err(DataForgeError::connector(SAM_GOV_SOURCE, e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "SAM.gov page failed, keeping what was fetched");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            let before = records.len();
            records.extend(
                page.iter()
                    .filter_map(opportunity_to_raw)
                    .take(query.limit - before),
            );
            if records.len() == before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!(count = records.len(), "SAM.gov search completed");
        Ok(records)
    }
}
