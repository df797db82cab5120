use std::thread;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::CanonicalBusinessRecord;
use crate::observability;

const CENSUS_BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder/geographies";
const CENSUS_BENCHMARK: &str = "Public_AR_Current";
const CENSUS_VINTAGE: &str = "Current_Current";
const MAX_ATTEMPTS: u32 = 3;

/// Address parts sent to a geocoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressQuery {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl AddressQuery {
    pub fn from_record(record: &CanonicalBusinessRecord) -> Self {
        Self {
            street: record.address_line1.clone(),
            city: record.city.clone(),
            state: Some(record.state.clone()).filter(|s| !s.is_empty()),
            zip: record.postal_code.clone(),
        }
    }

    /// Enough to attempt a lookup: a street or a ZIP.
    pub fn is_locatable(&self) -> bool {
        self.street.is_some() || self.zip.is_some()
    }

    /// Street, city and state present: the one-line form is usable.
    pub fn is_complete(&self) -> bool {
        self.street.is_some() && self.city.is_some() && self.state.is_some()
    }

    pub fn one_line(&self) -> String {
        [&self.street, &self.city, &self.state, &self.zip]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// County resolved for an address. FIPS is the 5-digit state+county code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountyMatch {
    pub county: Option<String>,
    pub county_fips: Option<String>,
}

/// Resolves an address to its county.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &AddressQuery) -> anyhow::Result<Option<CountyMatch>>;
}

/// Fill `county` and `county_fips` from the geocoder. Lookup failures are
/// logged and leave the record unchanged.
pub fn enrich_county(geocoder: &dyn Geocoder, mut record: CanonicalBusinessRecord) -> CanonicalBusinessRecord {
    let query = AddressQuery::from_record(&record);
    if !query.is_locatable() {
        return record;
    }

    match geocoder.geocode(&query) {
        Ok(Some(found)) => {
            debug!(
                company = %record.company_name,
                county = ?found.county,
                fips = ?found.county_fips,
                "Geocoded business record"
            );
            observability::enrich::geocode_result("matched");
            if found.county.is_some() {
                record.county = found.county;
            }
            if let Some(fips) = found.county_fips.filter(|f| is_five_digit(f)) {
                record.county_fips = Some(fips);
            }
        }
        Ok(None) => {
            debug!(company = %record.company_name, "No geocoding match");
            observability::enrich::geocode_result("no_match");
        }
        Err(e) => {
            warn!(company = %record.company_name, error = %e, "Geocoding failed, keeping record as is");
            observability::enrich::geocode_result("error");
        }
    }
    record
}

fn is_five_digit(value: &str) -> bool {
    value.len() == 5 && value.chars().all(|c| c.is_ascii_digit())
}

/// U.S. Census geocoder. Uses the one-line endpoint when street, city and
/// state are known, the component endpoint otherwise. No API key needed.
pub struct CensusGeocoder {
    client: reqwest::blocking::Client,
    base_url: String,
    retry_delay: Duration,
}

impl CensusGeocoder {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(CENSUS_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("dataforge/0.1")
            .build()
            .context("Failed to build geocoder HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_secs(2),
        })
    }

    fn request(&self, address: &AddressQuery) -> anyhow::Result<Value> {
        let mut params: Vec<(&str, String)> = vec![
            ("benchmark", CENSUS_BENCHMARK.to_string()),
            ("vintage", CENSUS_VINTAGE.to_string()),
            ("format", "json".to_string()),
        ];
        let url = if address.is_complete() {
            params.push(("address", address.one_line()));
            format!("{}/onelineaddress", self.base_url)
        } else {
            params.push(("street", address.street.clone().unwrap_or_default()));
            params.push(("city", address.city.clone().unwrap_or_default()));
            params.push(("state", address.state.clone().unwrap_or_default()));
            params.push(("zip", address.zip.clone().unwrap_or_default()));
            format!("{}/address", self.base_url)
        };

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .with_context(|| format!("Census geocoder request to {url} failed"))?
            .error_for_status()?;
        Ok(response.json::<Value>()?)
    }
}

impl Geocoder for CensusGeocoder {
    fn geocode(&self, address: &AddressQuery) -> anyhow::Result<Option<CountyMatch>> {
        let mut attempt = 1;
        let body = loop {
            match self.request(address) {
                Ok(body) => break body,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %e, "Retrying Census geocoder request");
                    thread::sleep(self.retry_delay * 2u32.pow(attempt - 1));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        Ok(parse_census_match(&body))
    }
}

/// County name and FIPS from the first address match of a Census response.
pub fn parse_census_match(body: &Value) -> Option<CountyMatch> {
    let first = body.pointer("/result/addressMatches/0")?;
    let county_geo = first.pointer("/geographies/Counties/0");

    let county = county_geo
        .and_then(|c| c.get("NAME"))
        .or_else(|| first.pointer("/addressComponents/county"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let county_fips = county_geo
        .and_then(|c| c.get("GEOID"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| is_five_digit(s))
        .map(str::to_string);

    Some(CountyMatch { county, county_fips })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    struct FixedGeocoder(anyhow::Result<Option<CountyMatch>>);

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, _address: &AddressQuery) -> anyhow::Result<Option<CountyMatch>> {
            match &self.0 {
                Ok(found) => Ok(found.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn located_record() -> CanonicalBusinessRecord {
        let mut record = CanonicalBusinessRecord::new("Acme", "CA", "test", Utc::now());
        record.address_line1 = Some("1 Main St".into());
        record.city = Some("Fresno".into());
        record.postal_code = Some("93721".into());
        record
    }

    #[test]
    fn test_enrich_fills_county_and_rejects_short_fips() {
        let geocoder = FixedGeocoder(Ok(Some(CountyMatch {
            county: Some("Fresno County".into()),
            county_fips: Some("06019".into()),
        })));
        let record = enrich_county(&geocoder, located_record());
        assert_eq!(record.county.as_deref(), Some("Fresno County"));
        assert_eq!(record.county_fips.as_deref(), Some("06019"));

        let short = FixedGeocoder(Ok(Some(CountyMatch {
            county: None,
            county_fips: Some("019".into()),
        })));
        assert_eq!(enrich_county(&short, located_record()).county_fips, None);
    }

    #[test]
    fn test_enrich_keeps_record_on_failure_or_no_address() {
        let failing = FixedGeocoder(Err(anyhow::anyhow!("timeout")));
        let record = enrich_county(&failing, located_record());
        assert_eq!(record.county, None);
        assert_eq!(record.address_line1.as_deref(), Some("1 Main St"));

        let bare = CanonicalBusinessRecord::new("Bare", "CA", "test", Utc::now());
        assert!(!AddressQuery::from_record(&bare).is_locatable());
    }

    #[test]
    fn test_one_line_address() {
        let query = AddressQuery::from_record(&located_record());
        assert!(query.is_complete());
        assert_eq!(query.one_line(), "1 Main St, Fresno, CA, 93721");
    }

    #[test]
    fn test_parse_census_response() {
        let body = json!({
            "result": {
                "addressMatches": [{
                    "addressComponents": {"county": "ignored"},
                    "geographies": {"Counties": [{"NAME": "Fresno County", "GEOID": "06019", "COUNTY": "019"}]}
                }]
            }
        });
        let found = parse_census_match(&body).unwrap();
        assert_eq!(found.county.as_deref(), Some("Fresno County"));
        assert_eq!(found.county_fips.as_deref(), Some("06019"));

        let empty = json!({"result": {"addressMatches": []}});
        assert!(parse_census_match(&empty).is_none());
    }
}
