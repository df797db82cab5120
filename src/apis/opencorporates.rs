use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::apis::text_at;
use crate::constants::{DEFAULT_COUNTRY, OPENCORPORATES_SOURCE};
use crate::error::{DataForgeError, Result};
use crate::types::{raw_record, RawRecord, RecordKind, SourceConnector, SourceQuery};

const API_BASE: &str = "https://api.opencorporates.com/v0.4/companies/search";
const MAX_PER_PAGE: usize = 100;

/// OpenCorporates company search. One jurisdiction per requested state,
/// paginated until the limit is reached or a page comes back empty.
pub struct OpenCorporatesConnector {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenCorporatesConnector {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("OpenCorporates API key not set, connector will return no records");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("DataForge/1.0")
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.to_string(),
        })
    }

    fn jurisdiction(state: &str) -> String {
        format!("us_{}", state.trim().to_lowercase())
    }

    /// Free-text query: NAICS codes then keywords.
    fn search_text(query: &SourceQuery) -> String {
        query
            .naics
            .iter()
            .chain(query.keywords.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn fetch_page(&self, api_key: &str, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("api_token", api_key)])
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Ok(body
            .pointer("/results/companies")
            .or_else(|| body.get("companies"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Map one search hit to the business raw-record shape.
pub fn company_to_raw(hit: &Value, state: &str) -> Option<RawRecord> {
    let company = hit.get("company").unwrap_or(hit);
    let name = text_at(company, "/name")?;
    let incorporation = text_at(company, "/incorporation_date");

    Some(raw_record(json!({
        "company_name": name,
        "domain": text_at(company, "/homepage_url"),
        "phone": text_at(company, "/phone_number"),
        "email": text_at(company, "/email"),
        "address_line1": text_at(company, "/registered_address/street_address"),
        "city": text_at(company, "/registered_address/locality"),
        "state": state.to_uppercase(),
        "postal_code": text_at(company, "/registered_address/postal_code"),
        "country": DEFAULT_COUNTRY,
        "founded_year": incorporation.as_deref().and_then(extract_year),
        "source": OPENCORPORATES_SOURCE,
    })))
}

/// Year from `YYYY-MM-DD`, `MM/DD/YYYY` or a leading `YYYY`, within a sane range.
pub fn extract_year(date: &str) -> Option<i32> {
    let date = date.trim();
    let candidate = if date.contains('-') {
        date.split('-').next()?
    } else if date.contains('/') {
        date.rsplit('/').next()?
    } else {
        date.get(..4)?
    };
    let year: i32 = candidate.parse().ok()?;
    (1800..=Utc::now().year() + 1).contains(&year).then_some(year)
}

#[async_trait]
impl SourceConnector for OpenCorporatesConnector {
    fn source_id(&self) -> &'static str {
        OPENCORPORATES_SOURCE
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Business
    }

    #[instrument(skip(self, query), fields(states = ?query.states))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("OpenCorporates API key not available, returning no records");
            return Ok(Vec::new());
        };

        let text = Self::search_text(query);
        if text.trim().is_empty() {
            warn!("No NAICS codes or keywords to search OpenCorporates with");
            return Ok(Vec::new());
        }

        let mut records: Vec<RawRecord> = Vec::new();
        let mut reachable = false;
        'states: for state in &query.states {
            let jurisdiction = Self::jurisdiction(state);
            let mut page = 1usize;
            while records.len() < query.limit {
                let per_page = MAX_PER_PAGE.min(query.limit - records.len());
                let params = [
                    ("q", text.clone()),
                    ("jurisdiction_code", jurisdiction.clone()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ];
                debug!(%jurisdiction, page, per_page, "OpenCorporates search page");

                let hits = match self.fetch_page(api_key, &params).await {
                    Ok(hits) => {
                        reachable = true;
                        hits
                    }
                    // first request failing means the API is unusable for this pull
                    Err(e) if !reachable => {
                        return Err(DataForgeError::connector(OPENCORPORATES_SOURCE, e.to_string()));
                    }
                    Err(e) => {
                        warn!(%jurisdiction, page, error = %e, "OpenCorporates page failed, moving on");
                        break;
                    }
                };
                if hits.is_empty() {
                    break;
                }
                for hit in &hits {
                    if records.len() >= query.limit {
                        break 'states;
                    }
                    if let Some(record) = company_to_raw(hit, state) {
                        records.push(record);
                    }
                }
                page += 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        info!(count = records.len(), "OpenCorporates search completed");
        Ok(records)
    }
}
