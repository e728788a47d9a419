//! Payloads exchanged with the commerce provider.
//!
//! Response types deserialize directly from the provider's JSON, so field
//! names follow its wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Money amount in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

/// OAuth grant sent to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode { .. } => "authorization_code",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Token endpoint request: application credentials plus a grant.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub grant: TokenGrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// One page of the catalog listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub objects: Vec<CatalogObject>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
    #[serde(default)]
    pub item_data: Option<CatalogItemData>,
    #[serde(default)]
    pub image_data: Option<CatalogImageData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogItemData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variations: Vec<CatalogVariation>,
    #[serde(default)]
    pub image_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVariation {
    pub id: String,
    #[serde(default)]
    pub item_variation_data: Option<CatalogVariationData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogVariationData {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price_money: Option<Money>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogImageData {
    #[serde(default)]
    pub url: Option<String>,
}

/// Order line sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteLineItem {
    pub name: String,
    /// Decimal string, as the provider requires.
    pub quantity: String,
    pub base_price_money: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_object_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub idempotency_key: String,
    pub location_id: String,
    pub line_items: Vec<RemoteLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    #[serde(default)]
    pub total_money: Option<Money>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub idempotency_key: String,
    pub source_id: String,
    pub amount_money: Money,
    pub order_id: String,
    pub location_id: String,
    pub verification_token: Option<String>,
    pub buyer_email_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePayment {
    pub id: String,
    pub status: String,
}

impl RemotePayment {
    /// Whether the payment captured or authorized funds.
    pub fn is_successful(&self) -> bool {
        matches!(self.status.as_str(), "COMPLETED" | "APPROVED")
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub idempotency_key: String,
    pub given_name: String,
    pub family_name: Option<String>,
    pub email_address: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCustomer {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct CreateRemoteBooking {
    pub idempotency_key: String,
    pub location_id: String,
    pub customer_id: String,
    pub start_at: DateTime<Utc>,
    pub customer_note: Option<String>,
    pub segment: AppointmentSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSegment {
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    pub service_variation_id: String,
    #[serde(default)]
    pub service_variation_version: Option<i64>,
    pub team_member_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteBooking {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AvailabilitySearch {
    pub location_id: String,
    pub service_variation_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAvailability {
    pub start_at: DateTime<Utc>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub appointment_segments: Vec<AppointmentSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_page_deserializes_provider_json() {
        let json = r#"{
            "objects": [
                {"type": "IMAGE", "id": "IMG1", "image_data": {"url": "https://img/1.jpg"}},
                {"type": "ITEM", "id": "ITEM1", "item_data": {
                    "name": "Mug",
                    "image_ids": ["IMG1"],
                    "variations": [{"id": "VAR1", "item_variation_data": {
                        "sku": "MUG-1",
                        "price_money": {"amount": 1250, "currency": "USD"}
                    }}]
                }}
            ],
            "cursor": "next"
        }"#;
        let page: CatalogPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.cursor.as_deref(), Some("next"));
        let item = page.objects[1].item_data.as_ref().unwrap();
        let variation = item.variations[0].item_variation_data.as_ref().unwrap();
        assert_eq!(variation.price_money.as_ref().unwrap().amount, 1250);
    }

    #[test]
    fn test_payment_success_statuses() {
        let payment = |status: &str| RemotePayment {
            id: "p".to_string(),
            status: status.to_string(),
        };
        assert!(payment("COMPLETED").is_successful());
        assert!(payment("APPROVED").is_successful());
        assert!(!payment("PENDING").is_successful());
        assert!(!payment("FAILED").is_successful());
    }

    #[test]
    fn test_line_item_serializes_quantity_as_string() {
        let line = RemoteLineItem {
            name: "Mug".to_string(),
            quantity: "2".to_string(),
            base_price_money: Money {
                amount: 1000,
                currency: "USD".to_string(),
            },
            catalog_object_id: None,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["quantity"], "2");
        assert!(json.get("catalog_object_id").is_none());
    }
}
