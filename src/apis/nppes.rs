use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::apis::opencorporates::extract_year;
use crate::constants::{DEFAULT_COUNTRY, NPPES_SOURCE};
use crate::error::{DataForgeError, Result};
use crate::types::{raw_record, RawRecord, RecordKind, SourceConnector, SourceQuery};

const NPPES_INDEX: &str = "https://download.cms.gov/nppes/NPI_Files.html";
const NPPES_DOWNLOAD_BASE: &str = "https://download.cms.gov/nppes";
const ORGANIZATION_ENTITY: &str = "2";
const DEFAULT_INDUSTRY: &str = "Healthcare";

const ENTITY_TYPE: &str = "Entity Type Code";
const NPI: &str = "NPI";
const ORG_NAME: &str = "Provider Organization Name (Legal Business Name)";
const ADDRESS: &str = "Provider First Line Business Practice Location Address";
const CITY: &str = "Provider Business Practice Location Address City Name";
const STATE: &str = "Provider Business Practice Location Address State Name";
const POSTAL: &str = "Provider Business Practice Location Address Postal Code";
const PHONE: &str = "Provider Business Practice Location Address Telephone Number";
const FAX: &str = "Provider Business Practice Location Address Fax Number";
const TAXONOMY: &str = "Healthcare Provider Taxonomy Code_1";
const ENUMERATION_DATE: &str = "Provider Enumeration Date";
const LAST_UPDATE: &str = "Last Update Date";

const COLUMNS: [&str; 12] = [
    ENTITY_TYPE,
    NPI,
    ORG_NAME,
    ADDRESS,
    CITY,
    STATE,
    POSTAL,
    PHONE,
    FAX,
    TAXONOMY,
    ENUMERATION_DATE,
    LAST_UPDATE,
];

static ARCHIVE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="([^"]*NPPES_Data_Dissemination_[^"]*\.zip)""#).expect("valid archive link regex")
});

/// Healthcare organizations from the CMS NPPES monthly dissemination file.
/// The ZIP is downloaded once into the cache directory; only Entity Type 2
/// rows (organizations) become business records.
pub struct NppesConnector {
    client: reqwest::Client,
    enabled: bool,
    index_url: String,
    cache_dir: PathBuf,
}

impl NppesConnector {
    pub fn new(enabled: bool, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_index_url(enabled, cache_dir, NPPES_INDEX)
    }

    pub fn with_index_url(enabled: bool, cache_dir: impl Into<PathBuf>, index_url: &str) -> Result<Self> {
        if !enabled {
            info!("NPPES connector disabled, set include_nppes to enable");
        }
        // the monthly archive is several gigabytes
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("DataForge/1.0")
            .build()?;
        Ok(Self {
            client,
            enabled,
            index_url: index_url.to_string(),
            cache_dir: cache_dir.into(),
        })
    }

    /// Newest archive linked from the index page, else the name this month's
    /// file would have.
    async fn latest_archive_url(&self) -> String {
        let fallback = || monthly_archive_url(Utc::now().date_naive());
        match self.fetch_index().await {
            Ok(Some(url)) => url,
            Ok(None) => {
                warn!("No archive link on the NPPES index page, using this month's file name");
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "NPPES index unavailable, using this month's file name");
                fallback()
            }
        }
    }

    async fn fetch_index(&self) -> Result<Option<String>> {
        let html = self
            .client
            .get(&self.index_url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(latest_archive_link(&html, &self.index_url))
    }

    /// Cached archive path, downloading it first when it is not there yet.
    async fn cached_archive(&self, url: &str) -> Result<PathBuf> {
        let path = self.cache_dir.join(archive_file_name(url));
        if path.exists() {
            info!(path = %path.display(), "NPPES archive already cached");
            return Ok(path);
        }

        fs::create_dir_all(&self.cache_dir)?;
        info!(%url, "Downloading NPPES archive");
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        // an interrupted download must not look cached
        let partial = path.with_extension("part");
        let mut file = File::create(&partial)?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
        }
        file.flush()?;
        fs::rename(&partial, &path)?;

        info!(path = %path.display(), "NPPES archive cached");
        Ok(path)
    }
}

/// Last dissemination archive linked from the index page, resolved against it.
pub fn latest_archive_link(html: &str, index_url: &str) -> Option<String> {
    let href = ARCHIVE_LINK.captures_iter(html).last()?.get(1)?.as_str();
    match Url::parse(index_url).and_then(|base| base.join(href)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(href.to_string()),
    }
}

/// `NPPES_Data_Dissemination_<Month>_<Year>.zip` for the given date.
pub fn monthly_archive_url(date: NaiveDate) -> String {
    format!(
        "{NPPES_DOWNLOAD_BASE}/NPPES_Data_Dissemination_{}_{}.zip",
        date.format("%B"),
        date.year()
    )
}

fn archive_file_name(url: &str) -> &str {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("nppes.zip")
}

/// Header positions of the columns the connector reads.
struct Columns(HashMap<&'static str, usize>);

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Self {
        Self(
            COLUMNS
                .iter()
                .filter_map(|&name| headers.iter().position(|h| h.trim() == name).map(|i| (name, i)))
                .collect(),
        )
    }

    // the file is not guaranteed UTF-8; bad bytes are replaced, not fatal
    fn get(&self, row: &csv::ByteRecord, name: &str) -> Option<String> {
        let raw = row.get(*self.0.get(name)?)?;
        let text = String::from_utf8_lossy(raw).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

fn organization_to_raw(columns: &Columns, row: &csv::ByteRecord) -> Option<RawRecord> {
    if columns.get(row, ENTITY_TYPE).as_deref() != Some(ORGANIZATION_ENTITY) {
        return None;
    }
    let name = columns.get(row, ORG_NAME)?;
    let enumeration_date = columns.get(row, ENUMERATION_DATE);

    Some(raw_record(json!({
        "company_name": name,
        "phone": columns.get(row, PHONE),
        "address_line1": columns.get(row, ADDRESS),
        "city": columns.get(row, CITY),
        "state": columns.get(row, STATE).map(|s| s.to_uppercase()),
        "postal_code": columns.get(row, POSTAL),
        "country": DEFAULT_COUNTRY,
        "industry": DEFAULT_INDUSTRY,
        "founded_year": enumeration_date.as_deref().and_then(extract_year),
        "source": NPPES_SOURCE,
        "npi": columns.get(row, NPI),
        "taxonomy_code": columns.get(row, TAXONOMY),
        "fax": columns.get(row, FAX),
        "enumeration_date": enumeration_date,
        "last_update": columns.get(row, LAST_UPDATE),
    })))
}

fn matches_query(record: &RawRecord, states: &[String], keywords: &[String]) -> bool {
    let field = |key: &str| record.get(key).and_then(|v| v.as_str()).unwrap_or_default();
    if !states.iter().any(|s| s.eq_ignore_ascii_case(field("state"))) {
        return false;
    }
    if keywords.is_empty() {
        return true;
    }
    let haystack = format!("{} {} {}", field("company_name"), field("industry"), field("taxonomy_code")).to_lowercase();
    keywords.iter().any(|k| haystack.contains(&k.to_lowercase()))
}

/// Organizations in the query's states (and matching any keyword) from the
/// first data CSV inside the archive, up to the query limit.
pub fn read_organizations(archive_path: &Path, query: &SourceQuery) -> Result<Vec<RawRecord>> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    let csv_name = archive
        .file_names()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".csv") && !lower.contains("fileheader")
        })
        .map(str::to_string)
        .next()
        .ok_or_else(|| DataForgeError::connector(NPPES_SOURCE, "no CSV file in archive"))?;
    info!(file = %csv_name, "Reading NPPES CSV");

    let entry = archive.by_name(&csv_name)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(entry);
    let columns = Columns::locate(reader.headers()?);
    if !columns.0.contains_key(ENTITY_TYPE) {
        return Err(DataForgeError::connector(NPPES_SOURCE, format!("{csv_name} has no {ENTITY_TYPE} column")));
    }

    let mut records = Vec::new();
    let mut scanned = 0usize;
    for row in reader.byte_records() {
        if records.len() >= query.limit {
            break;
        }
        let row = row?;
        scanned += 1;
        if let Some(record) = organization_to_raw(&columns, &row) {
            if matches_query(&record, &query.states, &query.keywords) {
                records.push(record);
            }
        }
    }
    debug!(scanned, kept = records.len(), "NPPES rows scanned");
    Ok(records)
}

#[async_trait]
impl SourceConnector for NppesConnector {
    fn source_id(&self) -> &'static str {
        NPPES_SOURCE
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Business
    }

    #[instrument(skip(self, query), fields(states = ?query.states))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let url = self.latest_archive_url().await;
        let archive = self
            .cached_archive(&url)
            .await
            .map_err(|e| DataForgeError::connector(NPPES_SOURCE, e.to_string()))?;

        let query = query.clone();
        let records = tokio::task::spawn_blocking(move || read_organizations(&archive, &query)).await??;

        info!(count = records.len(), "NPPES search completed");
        Ok(records)
    }
}
