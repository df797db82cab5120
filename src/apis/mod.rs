// Source connectors: business registries and federal solicitations

pub mod grants_gov;
pub mod nppes;
pub mod opencorporates;
pub mod sam_opps;
pub mod state_manual;

use std::sync::Arc;

use serde_json::Value;

use crate::config::Settings;
use crate::constants::{
    GRANTS_GOV_SOURCE, NPPES_SOURCE, OPENCORPORATES_SOURCE, SAM_GOV_SOURCE, STATE_MANUAL_SOURCE,
};
use crate::error::{DataForgeError, Result};
use crate::types::SourceConnector;

pub use grants_gov::GrantsGovConnector;
pub use nppes::NppesConnector;
pub use opencorporates::OpenCorporatesConnector;
pub use sam_opps::SamOpportunitiesConnector;
pub use state_manual::StateManualConnector;

/// Trimmed, non-empty string at a JSON pointer. Numbers are rendered.
pub(crate) fn text_at(value: &Value, pointer: &str) -> Option<String> {
    let text = match value.pointer(pointer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Build one connector by id.
pub fn create_connector(source_id: &str, settings: &Settings) -> Result<Arc<dyn SourceConnector>> {
    match source_id {
        OPENCORPORATES_SOURCE => Ok(Arc::new(OpenCorporatesConnector::new(
            settings.opencorp_api_key.clone(),
        )?)),
        NPPES_SOURCE => Ok(Arc::new(NppesConnector::new(
            settings.include_nppes,
            settings.nppes_cache_dir(),
        )?)),
        STATE_MANUAL_SOURCE => Ok(Arc::new(StateManualConnector::new(settings.state_manual_dir()))),
        SAM_GOV_SOURCE => Ok(Arc::new(SamOpportunitiesConnector::new(settings.sam_api_key.clone())?)),
        GRANTS_GOV_SOURCE => Ok(Arc::new(GrantsGovConnector::new(settings.include_grants)?)),
        other => Err(DataForgeError::invalid(format!("Unknown source: {other}"))),
    }
}

/// All business connectors, in pull order.
pub fn business_connectors(settings: &Settings) -> Result<Vec<Arc<dyn SourceConnector>>> {
    crate::constants::get_business_sources()
        .into_iter()
        .map(|id| create_connector(id, settings))
        .collect()
}

/// All solicitation connectors.
pub fn rfp_connectors(settings: &Settings) -> Result<Vec<Arc<dyn SourceConnector>>> {
    crate::constants::get_rfp_sources()
        .into_iter()
        .map(|id| create_connector(id, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;
    use serde_json::json;

    #[test]
    fn test_text_at() {
        let value = json!({"a": {"b": "  x "}, "n": 5, "e": "", "o": {}});
        assert_eq!(text_at(&value, "/a/b").as_deref(), Some("x"));
        assert_eq!(text_at(&value, "/n").as_deref(), Some("5"));
        assert_eq!(text_at(&value, "/e"), None);
        assert_eq!(text_at(&value, "/o"), None);
        assert_eq!(text_at(&value, "/missing"), None);
    }

    #[test]
    fn test_factory_builds_each_kind() {
        let settings = Settings::default();
        let business = business_connectors(&settings).unwrap();
        let ids: Vec<&str> = business.iter().map(|c| c.source_id()).collect();
        assert_eq!(ids, vec!["opencorporates", "nppes", "state_manual"]);
        assert!(business.iter().all(|c| c.kind() == RecordKind::Business));

        let rfp = rfp_connectors(&settings).unwrap();
        let ids: Vec<&str> = rfp.iter().map(|c| c.source_id()).collect();
        assert_eq!(ids, vec!["sam.gov", "grants.gov"]);
        assert!(rfp.iter().all(|c| c.kind() == RecordKind::Rfp));

        assert!(create_connector("usaspending", &settings).is_err());
    }
}
