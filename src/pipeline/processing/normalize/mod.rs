use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::constants::{DEFAULT_COUNTRY, SAM_GOV_SOURCE, UNKNOWN_COMPANY, UNKNOWN_SOURCE, UNTITLED_NOTICE};
use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord};
use crate::types::RawRecord;

static TRAILING_ZIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{5})(?:-\d{4})?\s*$").expect("valid zip regex"));
static STATE_ZIP_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[,\s]+[a-z]{2}\s+\d{5}(?:-\d{4})?\s*$").expect("valid state zip regex")
});

/// Trait for normalizing raw source records into canonical shapes.
///
/// Normalizers never fail: every field degrades to absent on its own.
pub trait Normalizer {
    type Output;

    fn normalize(&self, raw: &RawRecord) -> Self::Output;
}

/// Projection of a raw business record onto the optional-field superset that
/// all business connectors share. Every primitive is rendered as a trimmed,
/// non-empty string; nested values are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusinessFields {
    pub company_name: Option<String>,
    pub domain: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line1: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub county: Option<String>,
    pub county_fips: Option<String>,
    pub naics_code: Option<String>,
    pub industry: Option<String>,
    pub founded_year: Option<String>,
    pub employee_count: Option<String>,
    pub annual_revenue_usd: Option<String>,
    pub source: Option<String>,
    pub last_verified: Option<String>,
    pub quality_score: Option<String>,
}

impl BusinessFields {
    pub fn project(raw: &RawRecord) -> Self {
        Self {
            company_name: text(raw, "company_name"),
            domain: text(raw, "domain"),
            phone: text(raw, "phone"),
            email: text(raw, "email"),
            address_line1: text(raw, "address_line1"),
            address: text(raw, "address"),
            city: text(raw, "city"),
            state: text(raw, "state"),
            postal_code: text(raw, "postal_code"),
            country: text(raw, "country"),
            county: text(raw, "county"),
            county_fips: text(raw, "county_fips"),
            naics_code: text(raw, "naics_code"),
            industry: text(raw, "industry"),
            founded_year: text(raw, "founded_year"),
            employee_count: text(raw, "employee_count"),
            annual_revenue_usd: text(raw, "annual_revenue_usd"),
            source: text(raw, "source"),
            last_verified: text(raw, "last_verified"),
            quality_score: text(raw, "quality_score"),
        }
    }
}

/// Projection of a raw solicitation record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RfpFields {
    pub notice_id: Option<String>,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub naics: Option<String>,
    pub solicitation_number: Option<String>,
    pub notice_type: Option<String>,
    pub posted_date: Option<String>,
    pub close_date: Option<String>,
    pub place_of_performance_state: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub estimated_value: Option<String>,
    pub source: Option<String>,
    pub last_checked: Option<String>,
}

impl RfpFields {
    pub fn project(raw: &RawRecord) -> Self {
        Self {
            notice_id: text(raw, "notice_id"),
            title: text(raw, "title"),
            agency: text(raw, "agency"),
            naics: text(raw, "naics"),
            solicitation_number: text(raw, "solicitation_number"),
            notice_type: text(raw, "notice_type"),
            posted_date: text(raw, "posted_date"),
            close_date: text(raw, "close_date"),
            place_of_performance_state: text(raw, "place_of_performance_state"),
            description: text(raw, "description"),
            url: text(raw, "url"),
            contact_name: text(raw, "contact_name"),
            contact_email: text(raw, "contact_email"),
            estimated_value: text(raw, "estimated_value"),
            source: text(raw, "source"),
            last_checked: text(raw, "last_checked"),
        }
    }
}

/// Normalizer for business records. Carries the clock used for the
/// `years_in_business` derivation and the `last_verified` default.
#[derive(Debug, Clone, Copy)]
pub struct BusinessNormalizer {
    now: DateTime<Utc>,
}

impl BusinessNormalizer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    /// Normalizer pinned to a fixed "now".
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    fn normalize_fields(&self, fields: BusinessFields) -> CanonicalBusinessRecord {
        let founded_year = fields.founded_year.as_deref().and_then(parse_int).and_then(|y| i32::try_from(y).ok());
        let years_in_business = founded_year.map(|year| (self.now.year() - year).max(0));

        // A free-form address stands in for address_line1, its locality for
        // city and its trailing ZIP for postal_code
        let city = fields
            .city
            .or_else(|| fields.address.as_deref().and_then(address_locality));
        let postal_code = fields.postal_code.or_else(|| {
            fields
                .address
                .as_deref()
                .and_then(|a| TRAILING_ZIP.captures(a))
                .map(|c| c[1].to_string())
        });
        let address_line1 = fields.address_line1.or(fields.address);

        CanonicalBusinessRecord {
            company_name: fields.company_name.unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
            domain: fields.domain,
            phone: fields.phone.as_deref().and_then(normalize_phone),
            email: fields.email,
            address_line1,
            city,
            state: fields.state.map(|s| s.to_uppercase()).unwrap_or_default(),
            postal_code,
            country: fields.country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            county: fields.county,
            county_fips: fields.county_fips,
            naics_code: fields.naics_code,
            industry: fields.industry,
            founded_year,
            years_in_business,
            employee_count: fields.employee_count.as_deref().and_then(parse_int),
            annual_revenue_usd: fields.annual_revenue_usd.as_deref().and_then(parse_int),
            business_size: None,
            is_small_business: None,
            source: fields.source.unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            last_verified: fields
                .last_verified
                .as_deref()
                .and_then(parse_datetime)
                .unwrap_or(self.now),
            quality_score: fields
                .quality_score
                .as_deref()
                .and_then(parse_int)
                .map(|s| s.clamp(0, 100) as u8)
                .unwrap_or(0),
        }
    }
}

impl Default for BusinessNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for BusinessNormalizer {
    type Output = CanonicalBusinessRecord;

    fn normalize(&self, raw: &RawRecord) -> CanonicalBusinessRecord {
        self.normalize_fields(BusinessFields::project(raw))
    }
}

/// Normalizer for solicitation records.
#[derive(Debug, Clone, Copy)]
pub struct RfpNormalizer {
    now: DateTime<Utc>,
}

impl RfpNormalizer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Default for RfpNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for RfpNormalizer {
    type Output = CanonicalRfpRecord;

    fn normalize(&self, raw: &RawRecord) -> CanonicalRfpRecord {
        let fields = RfpFields::project(raw);
        CanonicalRfpRecord {
            notice_id: fields.notice_id.unwrap_or_default(),
            title: fields.title.unwrap_or_else(|| UNTITLED_NOTICE.to_string()),
            agency: fields.agency,
            naics: fields.naics,
            solicitation_number: fields.solicitation_number,
            notice_type: fields.notice_type,
            posted_date: fields.posted_date.as_deref().and_then(parse_date),
            close_date: fields.close_date.as_deref().and_then(parse_date),
            place_of_performance_state: fields.place_of_performance_state,
            description: fields.description,
            url: fields.url,
            contact_name: fields.contact_name,
            contact_email: fields.contact_email,
            estimated_value: fields.estimated_value,
            source: fields.source.unwrap_or_else(|| SAM_GOV_SOURCE.to_string()),
            last_checked: fields
                .last_checked
                .as_deref()
                .and_then(parse_datetime)
                .unwrap_or(self.now),
        }
    }
}

/// Render a primitive value as a trimmed string; empty strings, nulls and
/// nested values are absent.
fn text(raw: &RawRecord, key: &str) -> Option<String> {
    let rendered = match raw.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// Locality of a one-line US address: the comma segment right before the
/// `ST 12345` tail. The street must come first, and a segment with digits is
/// a unit rather than a city.
pub fn address_locality(address: &str) -> Option<String> {
    let tail = STATE_ZIP_TAIL.find(address)?;
    let (street, city) = address[..tail.start()].rsplit_once(',')?;
    let city = city.trim();
    if street.trim().is_empty() || city.is_empty() || city.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(city.to_string())
}

/// Strip non-digits and format as E.164 when the digits form a plausible US
/// number; otherwise keep the digit string. No digits means no phone.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    // NANP area codes never start with 0 or 1
    let area_code_ok = |d: &str| matches!(d.as_bytes().first(), Some(b'2'..=b'9'));
    let formatted = match digits.len() {
        10 if area_code_ok(&digits) => format!("+1{digits}"),
        11 if digits.starts_with('1') && area_code_ok(&digits[1..]) => format!("+{digits}"),
        _ => digits,
    };
    Some(formatted)
}

/// Integer coercion. Thousands separators are tolerated; fractional values
/// are not integers and come back absent.
pub fn parse_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if let Ok(value) = cleaned.parse::<i64>() {
        return Some(value);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}

pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    parse_date(trimmed)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
