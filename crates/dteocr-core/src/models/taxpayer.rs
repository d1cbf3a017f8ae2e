//! Taxpayer data returned by the SII registry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rut::Rut;

/// Registry data for one taxpayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxpayerRecord {
    pub identifier: Rut,

    /// Razón social.
    pub legal_name: String,

    /// Giro.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_activity: Option<String>,

    /// Actividad económica, reported separately from the giro.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic_activity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commune: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// When the registry last confirmed this data.
    pub last_verified_at: DateTime<Utc>,
}

impl TaxpayerRecord {
    /// Whether the record is still usable at `now` given a time-to-live.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_verified_at) < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_aged(days: i64, now: DateTime<Utc>) -> TaxpayerRecord {
        TaxpayerRecord {
            identifier: Rut::from_body(12345678),
            legal_name: "Comercial Andes SpA".to_string(),
            business_activity: None,
            economic_activity: None,
            address: None,
            commune: None,
            region: None,
            last_verified_at: now - Duration::days(days),
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let ttl = Duration::days(30);

        assert!(record_aged(0, now).is_fresh(ttl, now));
        assert!(record_aged(29, now).is_fresh(ttl, now));
        assert!(!record_aged(30, now).is_fresh(ttl, now));
        assert!(!record_aged(31, now).is_fresh(ttl, now));
    }
}
