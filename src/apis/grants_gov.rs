use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::apis::text_at;
use crate::constants::GRANTS_GOV_SOURCE;
use crate::error::{DataForgeError, Result};
use crate::types::{raw_record, RawRecord, RecordKind, SourceConnector, SourceQuery};

const GRANTS_ENDPOINT: &str = "https://www.grants.gov/api/search2";
const MAX_PER_PAGE: usize = 100;
const GRANT_NOTICE_TYPE: &str = "Grant";

/// Grants.gov Search2 opportunities. Off unless `include_grants` is set.
pub struct GrantsGovConnector {
    client: reqwest::Client,
    enabled: bool,
    base_url: String,
}

impl GrantsGovConnector {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_url(enabled, GRANTS_ENDPOINT)
    }

    pub fn with_base_url(enabled: bool, base_url: &str) -> Result<Self> {
        if !enabled {
            info!("Grants.gov connector disabled, set include_grants to enable");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("DataForge/1.0")
            .build()?;
        Ok(Self {
            client,
            enabled,
            base_url: base_url.to_string(),
        })
    }

    /// Keyword and posted-window parameters; paging is added per request.
    fn search_params(query: &SourceQuery) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !query.keywords.is_empty() {
            params.push(("q", query.keywords.join(" ")));
        }
        if let Some(from) = query.posted_from {
            params.push(("postedFrom", from.to_string()));
        }
        if let Some(to) = query.posted_to {
            params.push(("postedTo", to.to_string()));
        }
        params
    }

    async fn fetch_page(&self, params: &[(&'static str, String)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Ok(grant_hits(&body))
    }
}

/// Hits from either the flat `results` list or the Search2 `data.oppHits` envelope.
pub fn grant_hits(body: &Value) -> Vec<Value> {
    body.get("results")
        .or_else(|| body.pointer("/data/oppHits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Map one grant opportunity to the solicitation raw-record shape.
pub fn grant_to_raw(grant: &Value) -> Option<RawRecord> {
    let notice_id = text_at(grant, "/opportunityId").or_else(|| text_at(grant, "/id"))?;
    let estimated_value = grant
        .get("estimatedValue")
        .filter(|v| v.is_number() || v.is_string())
        .cloned()
        .unwrap_or(Value::Null);

    Some(raw_record(json!({
        "notice_id": notice_id,
        "title": text_at(grant, "/title"),
        "agency": text_at(grant, "/agency").or_else(|| text_at(grant, "/agencyName")),
        "naics": text_at(grant, "/naics"),
        "solicitation_number": text_at(grant, "/opportunityNumber").or_else(|| text_at(grant, "/number")),
        "notice_type": GRANT_NOTICE_TYPE,
        "posted_date": text_at(grant, "/postedDate").or_else(|| text_at(grant, "/openDate")),
        "close_date": text_at(grant, "/closeDate"),
        "place_of_performance_state": text_at(grant, "/state"),
        "description": text_at(grant, "/description"),
        "url": text_at(grant, "/url"),
        "contact_name": text_at(grant, "/contactName"),
        "contact_email": text_at(grant, "/contactEmail"),
        "estimated_value": estimated_value,
        "source": GRANTS_GOV_SOURCE,
    })))
}

#[async_trait]
impl SourceConnector for GrantsGovConnector {
    fn source_id(&self) -> &'static str {
        GRANTS_GOV_SOURCE
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Rfp
    }

    #[instrument(skip(self, query), fields(keywords = ?query.keywords))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let base = Self::search_params(query);
        let mut records: Vec<RawRecord> = Vec::new();
        let mut offset = 0usize;
        while records.len() < query.limit {
            let mut params = base.clone();
            params.push(("limit", MAX_PER_PAGE.min(query.limit - records.len()).to_string()));
            params.push(("offset", offset.to_string()));
            debug!(offset, "Grants.gov search page");

            let page = match self.fetch_page(&params).await {
                Ok(page) => page,
                Err(e) if offset == 0 => {
                    return Err(DataForgeError::connector(GRANTS_GOV_SOURCE, e.to_string()));
                }
                Err(e) => {
                    warn!(offset, error = %e, "Grants.gov page failed, keeping what was fetched");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            offset += page.len();
            let room = query.limit - records.len();
            records.extend(page.iter().filter_map(grant_to_raw).take(room));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!(count = records.len(), "Grants.gov search completed");
        Ok(records)
    }
}
