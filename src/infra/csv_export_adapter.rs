use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::ExportPort;
use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord, PullCriteria, RfpCriteria};
use crate::error::Result;
use crate::observability;

pub const BUSINESS_HEADER: [&str; 22] = [
    "company_name",
    "domain",
    "phone",
    "email",
    "address_line1",
    "city",
    "state",
    "postal_code",
    "country",
    "county",
    "county_fips",
    "naics_code",
    "industry",
    "founded_year",
    "years_in_business",
    "employee_count",
    "annual_revenue_usd",
    "business_size",
    "is_small_business",
    "source",
    "last_verified",
    "quality_score",
];

pub const RFP_HEADER: [&str; 16] = [
    "notice_id",
    "title",
    "agency",
    "naics",
    "solicitation_number",
    "notice_type",
    "posted_date",
    "close_date",
    "place_of_performance_state",
    "description",
    "url",
    "contact_name",
    "contact_email",
    "estimated_value",
    "source",
    "last_checked",
];

/// Writes each batch to its own CSV file under the export directory.
pub struct CsvExportAdapter {
    export_dir: PathBuf,
}

impl CsvExportAdapter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    fn target(&self, file_name: String) -> Result<PathBuf> {
        fs::create_dir_all(&self.export_dir)?;
        Ok(self.export_dir.join(file_name))
    }
}

/// `<prefix>-YYYYMMDD-<sorted states>-<naics, else keywords, else "all">.csv`
pub fn export_file_name(prefix: &str, date: NaiveDate, states: &[String], naics: &[String], keywords: &[String]) -> String {
    let mut states: Vec<&str> = states.iter().map(String::as_str).collect();
    states.sort_unstable();

    let filters: Vec<String> = if !naics.is_empty() {
        naics.iter().map(|n| slug(n)).collect()
    } else if !keywords.is_empty() {
        keywords.iter().map(|k| slug(k)).collect()
    } else {
        vec!["all".to_string()]
    };

    format!(
        "{prefix}-{}-{}-{}.csv",
        date.format("%Y%m%d"),
        states.join("-"),
        filters.join("-")
    )
}

// keywords are free text; keep them path-safe
fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn business_row(record: &CanonicalBusinessRecord) -> Vec<String> {
    vec![
        record.company_name.clone(),
        opt(&record.domain),
        opt(&record.phone),
        opt(&record.email),
        opt(&record.address_line1),
        opt(&record.city),
        record.state.clone(),
        opt(&record.postal_code),
        record.country.clone(),
        opt(&record.county),
        opt(&record.county_fips),
        opt(&record.naics_code),
        opt(&record.industry),
        opt(&record.founded_year),
        opt(&record.years_in_business),
        opt(&record.employee_count),
        opt(&record.annual_revenue_usd),
        opt(&record.business_size),
        opt(&record.is_small_business),
        record.source.clone(),
        record.last_verified.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.quality_score.to_string(),
    ]
}

fn rfp_row(record: &CanonicalRfpRecord) -> Vec<String> {
    vec![
        record.notice_id.clone(),
        record.title.clone(),
        opt(&record.agency),
        opt(&record.naics),
        opt(&record.solicitation_number),
        opt(&record.notice_type),
        opt(&record.posted_date),
        opt(&record.close_date),
        opt(&record.place_of_performance_state),
        opt(&record.description),
        opt(&record.url),
        opt(&record.contact_name),
        opt(&record.contact_email),
        opt(&record.estimated_value),
        record.source.clone(),
        record.last_checked.to_rfc3339_opts(SecondsFormat::Secs, true),
    ]
}

fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> Result<usize>
where
    I: Iterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.write_record(&row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[async_trait]
impl ExportPort for CsvExportAdapter {
    async fn export_business(&self, records: &[CanonicalBusinessRecord], criteria: &PullCriteria) -> Result<PathBuf> {
        let name = export_file_name(
            "business",
            Utc::now().date_naive(),
            &criteria.states,
            &criteria.naics,
            &criteria.keywords,
        );
        let path = self.target(name)?;
        let rows = write_csv(&path, &BUSINESS_HEADER, records.iter().map(business_row))?;

        info!(rows, path = %path.display(), "Wrote business export");
        observability::export::file_written("business", rows);
        Ok(path)
    }

    async fn export_rfps(&self, records: &[CanonicalRfpRecord], criteria: &RfpCriteria) -> Result<PathBuf> {
        let name = export_file_name(
            "rfps",
            Utc::now().date_naive(),
            &criteria.states,
            &criteria.naics,
            &criteria.keywords,
        );
        let path = self.target(name)?;
        let rows = write_csv(&path, &RFP_HEADER, records.iter().map(rfp_row))?;

        info!(rows, path = %path.display(), "Wrote RFP export");
        observability::export::file_written("rfp", rows);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BusinessSize;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_file_name_sorts_states_and_picks_filter() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        assert_eq!(
            export_file_name("business", date, &strings(&["TX", "CA"]), &strings(&["621111"]), &strings(&["x"])),
            "business-20250915-CA-TX-621111.csv"
        );
        assert_eq!(
            export_file_name("rfps", date, &strings(&["VA"]), &[], &strings(&["cloud ops"])),
            "rfps-20250915-VA-cloud_ops.csv"
        );
        assert_eq!(
            export_file_name("rfps", date, &strings(&["VA"]), &[], &[]),
            "rfps-20250915-VA-all.csv"
        );
    }

    #[tokio::test]
    async fn test_business_export_header_and_row() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvExportAdapter::new(dir.path().join("out"));
        let verified = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut record = CanonicalBusinessRecord::new("Acme, Inc", "CA", "a;b", verified);
        record.employee_count = Some(12);
        record.business_size = Some(BusinessSize::Small);
        record.is_small_business = Some(true);
        record.quality_score = 65;
        let criteria = PullCriteria {
            states: strings(&["CA"]),
            ..PullCriteria::default()
        };

        let path = adapter.export_business(&[record], &criteria).await.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-CA-all.csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, BUSINESS_HEADER);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "Acme, Inc");
        assert_eq!(&rows[0][1], "");
        assert_eq!(&rows[0][15], "12");
        assert_eq!(&rows[0][17], "small");
        assert_eq!(&rows[0][18], "true");
        assert_eq!(&rows[0][19], "a;b");
        assert_eq!(&rows[0][20], "2025-01-02T03:04:05Z");
        assert_eq!(&rows[0][21], "65");
    }

    #[tokio::test]
    async fn test_rfp_export_header() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvExportAdapter::new(dir.path());
        let record = CanonicalRfpRecord {
            notice_id: "n-1".into(),
            title: "Cloud".into(),
            agency: None,
            naics: Some("541511".into()),
            solicitation_number: None,
            notice_type: None,
            posted_date: NaiveDate::from_ymd_opt(2025, 9, 1),
            close_date: None,
            place_of_performance_state: Some("VA".into()),
            description: None,
            url: None,
            contact_name: None,
            contact_email: None,
            estimated_value: Some("100000".into()),
            source: "sam.gov".into(),
            last_checked: Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap(),
        };
        let criteria = RfpCriteria {
            states: strings(&["VA"]),
            naics: strings(&["541511"]),
            keywords: Vec::new(),
            posted_from: None,
            posted_to: None,
            limit: 10,
        };

        let path = adapter.export_rfps(&[record], &criteria).await.unwrap();
        let content = fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), RFP_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "n-1,Cloud,,541511,,,2025-09-01,,VA,,,,,100000,sam.gov,2025-09-02T00:00:00Z"
        );
    }
}
