use std::sync::Arc;

use anyhow::Result;
use dataforge::apis::{SamOpportunitiesConnector, StateManualConnector};
use dataforge::app::{BusinessPullUseCase, RfpPullUseCase};
use dataforge::domain::{BusinessPullRequest, RfpPullRequest};
use dataforge::infra::{CsvExportAdapter, BUSINESS_HEADER};
use dataforge::pipeline::ingestion::Ingestor;
use dataforge::storage::{InMemoryPreviewStore, PreviewStore};
use dataforge::BusinessPipeline;
use tempfile::tempdir;

#[tokio::test]
async fn test_state_manual_drop_to_csv_export() -> Result<()> {
    let temp_dir = tempdir()?;
    let drops = temp_dir.path().join("state_manual");
    let exports = temp_dir.path().join("exports");

    let connector = StateManualConnector::new(&drops);
    connector.create_sample_mapper("TX")?;
    std::fs::write(
        drops.join("tx_registry.csv"),
        "Company Name,Website,Phone,Address,City,Zip Code,NAICS,Industry,Employees\n\
         Lone Star Clinic,lonestar.test,512-555-0100,1 Main St,Austin,78701,621111,Telehealth,8\n\
         Lone Star Clinic LLC,LONESTAR.test,,,Austin,78701,621111,Telehealth,\n\
         Hill Country Retail,hcr.test,512-555-0199,2 Oak Ave,Austin,78702,452319,Retail,300\n",
    )?;

    let preview = Arc::new(InMemoryPreviewStore::new(50));
    let use_case = BusinessPullUseCase::new(
        Ingestor::new(vec![Arc::new(connector)]),
        BusinessPipeline::new(),
        Arc::new(CsvExportAdapter::new(&exports)),
        preview.clone(),
    );

    let mut request = BusinessPullRequest::for_states(&["tx"]);
    request.keywords = Some(vec!["telehealth".to_string()]);
    let criteria = request.validate(false)?;

    let response = use_case.execute(&criteria).await?;
    assert!(response.ok, "{:?}", response.qa_report);
    assert_eq!(response.message.as_deref(), Some("Exported 1 business records"));

    let path = response.export_path.expect("export written");
    assert!(path.ends_with("-TX-telehealth.csv"));
    let mut reader = csv::Reader::from_path(&path)?;
    assert_eq!(reader.headers()?.iter().collect::<Vec<_>>(), BUSINESS_HEADER);
    let rows: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "Lone Star Clinic");
    assert_eq!(&rows[0][19], "state_manual:TX");

    let page = preview.business_page(1, 25).await?;
    assert_eq!(page.total, 1);
    Ok(())
}

#[tokio::test]
async fn test_rfp_pull_with_mock_notices() -> Result<()> {
    let temp_dir = tempdir()?;
    let preview = Arc::new(InMemoryPreviewStore::new(50));
    let use_case = RfpPullUseCase::new(
        Ingestor::new(vec![Arc::new(SamOpportunitiesConnector::new(None)?)]),
        Arc::new(CsvExportAdapter::new(temp_dir.path())),
        preview.clone(),
    );

    let request = RfpPullRequest {
        states: vec!["va".to_string(), "md".to_string()],
        naics: Some(vec!["541511".to_string()]),
        keywords: None,
        posted_from: None,
        posted_to: None,
        limit: 4,
    };
    let response = use_case.execute(&request.validate()?).await?;

    assert!(response.ok);
    assert_eq!(response.message.as_deref(), Some("Exported 4 RFP records"));
    let report = response.qa_report.expect("report for a non-empty batch");
    assert_eq!(report.dupes, 0);
    assert!(response
        .export_path
        .expect("export written")
        .ends_with("-MD-VA-541511.csv"));

    let page = preview.rfp_page(1, 2).await?;
    assert_eq!(page.total, 4);
    assert_eq!(page.items[0].notice_id, "mock-004");
    assert_eq!(page.items[0].source, "sam.gov (mock)");
    Ok(())
}
