//! Static reference data: regional IXPs and known ISPs.
//!
//! A built-in dataset ships with the crate; a JSON file with the same layout can
//! replace it at startup.
use crate::PeerLensError;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Country code used when an ASN is not in the ISP list.
pub const UNKNOWN_COUNTRY: &str = "unknown";

/// A regional Internet Exchange Point.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(tabled::Tabled))]
pub struct RegionalIxp {
    /// registry IXP id
    pub id: u32,
    pub name: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
}

/// A known ISP.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(tabled::Tabled))]
pub struct IspRecord {
    pub asn: u32,
    pub name: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
}

/// Reference lists used by the report builder and the ISP listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    pub regional_ixps: Vec<RegionalIxp>,
    pub isps: Vec<IspRecord>,
}

impl ReferenceData {
    /// Load reference data from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, PeerLensError> {
        info!("loading reference data from {}", path);
        let content = std::fs::read_to_string(path)?;
        let data: ReferenceData = serde_json::from_str(content.as_str())?;
        Ok(data)
    }

    /// Load from `path` when given, otherwise use the built-in lists.
    pub fn load(path: Option<&str>) -> Result<Self, PeerLensError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(DEFAULT_REFERENCE_DATA.clone()),
        }
    }

    pub fn isp(&self, asn: u32) -> Option<&IspRecord> {
        self.isps.iter().find(|isp| isp.asn == asn)
    }

    /// Country of a known ISP, or [UNKNOWN_COUNTRY].
    pub fn country_of(&self, asn: u32) -> &str {
        self.isp(asn)
            .map(|isp| isp.country.as_str())
            .unwrap_or(UNKNOWN_COUNTRY)
    }

    /// The first regional IXP listed for a country.
    pub fn regional_ixp_for(&self, country: &str) -> Option<&RegionalIxp> {
        self.regional_ixps
            .iter()
            .find(|ixp| ixp.country.eq_ignore_ascii_case(country))
    }
}

lazy_static! {
    pub static ref DEFAULT_REFERENCE_DATA: ReferenceData = serde_json::from_str(
        r#"
    {
  "regional_ixps": [
    { "id": 26, "name": "AMS-IX", "country": "NL" },
    { "id": 31, "name": "DE-CIX Frankfurt", "country": "DE" },
    { "id": 18, "name": "LINX LON1", "country": "GB" },
    { "id": 359, "name": "France-IX Paris", "country": "FR" },
    { "id": 1, "name": "Equinix Ashburn", "country": "US" },
    { "id": 158, "name": "Equinix Singapore", "country": "SG" },
    { "id": 42, "name": "HKIX", "country": "HK" },
    { "id": 87, "name": "JPIX Tokyo", "country": "JP" },
    { "id": 171, "name": "IX.br São Paulo", "country": "BR" },
    { "id": 94, "name": "NAPAfrica Johannesburg", "country": "ZA" }
  ],
  "isps": [
    { "asn": 1136, "name": "KPN", "country": "NL" },
    { "asn": 3320, "name": "Deutsche Telekom", "country": "DE" },
    { "asn": 2856, "name": "BT", "country": "GB" },
    { "asn": 3215, "name": "Orange", "country": "FR" },
    { "asn": 7922, "name": "Comcast", "country": "US" },
    { "asn": 7018, "name": "AT&T", "country": "US" },
    { "asn": 4657, "name": "StarHub", "country": "SG" },
    { "asn": 4760, "name": "HKT", "country": "HK" },
    { "asn": 2516, "name": "KDDI", "country": "JP" },
    { "asn": 28573, "name": "Claro Brasil", "country": "BR" },
    { "asn": 37457, "name": "Telkom SA", "country": "ZA" }
  ]
    }
    "#
    )
    .unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reference_data() {
        let data = ReferenceData::load(None).unwrap();
        assert!(!data.regional_ixps.is_empty());
        assert!(!data.isps.is_empty());
        assert_eq!(data.country_of(3320), "DE");
        assert_eq!(data.country_of(64512), UNKNOWN_COUNTRY);
        assert_eq!(data.regional_ixp_for("DE").unwrap().id, 31);
        assert_eq!(data.regional_ixp_for("de").unwrap().id, 31);
        assert!(data.regional_ixp_for(UNKNOWN_COUNTRY).is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(
            &path,
            r#"{"regional_ixps":[{"id":7,"name":"Test-IX","country":"AQ"}],
                "isps":[{"asn":64500,"name":"Test ISP","country":"AQ"}]}"#,
        )
        .unwrap();
        let data = ReferenceData::load(path.to_str()).unwrap();
        assert_eq!(data.isp(64500).unwrap().name, "Test ISP");
        assert_eq!(data.regional_ixp_for("AQ").unwrap().id, 7);
    }

    #[test]
    fn test_from_missing_file() {
        assert!(ReferenceData::load(Some("/nonexistent/reference.json")).is_err());
    }
}
