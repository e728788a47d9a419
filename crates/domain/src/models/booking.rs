//! Bookable services and bookings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::validation::validate_phone;
use uuid::Uuid;
use validator::Validate;

/// A bookable service linked to a provider service variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub remote_variation_id: Option<String>,
    pub remote_variation_version: Option<i64>,
}

/// Local cache of a provider booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub remote_booking_id: String,
    pub remote_customer_id: String,
    pub service_id: Uuid,
    pub staff_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub remote_booking_id: String,
    pub remote_customer_id: String,
    pub service_id: Uuid,
    pub staff_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub notes: Option<String>,
}

/// Query parameters for availability search.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// A bookable slot, normalized from the provider response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySlot {
    pub start_at: DateTime<Utc>,
    pub location_id: String,
    pub segments: Vec<SlotSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSegment {
    pub staff_id: String,
    pub variation_id: String,
    pub variation_version: Option<i64>,
    pub duration_minutes: i32,
}

/// Request payload for creating a booking.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub service_id: Uuid,

    pub start_at: DateTime<Utc>,

    #[validate(length(min = 1, max = 100, message = "Staff member is required"))]
    pub staff_id: String,

    /// Service variation version from the availability slot.
    pub variation_version: Option<i64>,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub customer_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub customer_email: String,

    #[validate(custom(function = "validate_phone"))]
    pub customer_phone: String,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

impl CreateBookingRequest {
    /// Splits the customer name into given and family names at the first
    /// whitespace.
    pub fn name_parts(&self) -> (String, Option<String>) {
        let trimmed = self.customer_name.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some((given, family)) => (given.to_string(), Some(family.trim().to_string())),
            None => (trimmed.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateBookingRequest {
        CreateBookingRequest {
            service_id: Uuid::new_v4(),
            start_at: Utc::now(),
            staff_id: "TM-1".to_string(),
            variation_version: Some(3),
            customer_name: "Ada Lovelace King".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: "(555) 123-4567".to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_rejects_short_phone() {
        let mut req = request();
        req.customer_phone = "12".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_email() {
        let mut req = request();
        req.customer_email = "nope".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_name_parts() {
        assert_eq!(
            request().name_parts(),
            ("Ada".to_string(), Some("Lovelace King".to_string()))
        );

        let mut single = request();
        single.customer_name = " Cher ".to_string();
        assert_eq!(single.name_parts(), ("Cher".to_string(), None));
    }
}
