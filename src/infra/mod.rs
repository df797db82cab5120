pub mod csv_export_adapter;

pub use csv_export_adapter::{CsvExportAdapter, BUSINESS_HEADER, RFP_HEADER};
