//! Normalized records shared by the store, the services and the HTTP layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSET_TYPE_NAME: &str = "Cryptocurrency";
pub const DEFAULT_ASSET_TYPE_DESCRIPTION: &str = "Digital currencies tracked from the market data provider";

/// Opaque handle for an authenticated user, supplied by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// One tracked asset. Decimals serialize as strings to keep full precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cryptocurrency {
    pub id: i64,
    pub asset_type_id: i64,
    pub symbol: String,
    pub name: String,
    pub slug: String,
    pub external_id: String,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowedCryptocurrency {
    #[serde(flatten)]
    pub cryptocurrency: Cryptocurrency,
    pub asset_type: AssetType,
}

/// Write model for the upsert keyed on `external_id`.
///
/// A `None` image keeps whatever image the stored row already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptocurrencyUpsert {
    pub asset_type_id: i64,
    pub symbol: String,
    pub name: String,
    pub slug: String,
    pub external_id: String,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(self) -> i64 {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
        }
    }
}

/// Path reference to an asset: either its numeric id or its slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_id(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<&str> for AssetRef {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn asset_ref_distinguishes_numeric_ids() {
        assert_eq!(AssetRef::from("42").as_id(), Some(42));
        assert_eq!(AssetRef::from(" bitcoin ").as_str(), "bitcoin");
        assert_eq!(AssetRef::from("bitcoin").as_id(), None);
    }

    #[test]
    fn record_serializes_decimals_as_strings() {
        let now = Utc::now();
        let record = Cryptocurrency {
            id: 1,
            asset_type_id: 1,
            symbol: "SHIB".to_string(),
            name: "Shiba Inu".to_string(),
            slug: "shiba-inu".to_string(),
            external_id: "shiba-inu".to_string(),
            current_price: dec!(0.00001234567890123),
            market_cap: dec!(7000000000),
            volume_24h: dec!(150000000.5),
            price_change_24h: dec!(-1.25),
            image_url: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["current_price"], "0.00001234567890123");
        assert_eq!(json["price_change_24h"], "-1.25");
        assert!(json["image_url"].is_null());
    }
}
