//! Service and booking entities (database row mappings).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{Booking, Service};

/// Database row mapping for the services table.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceEntity {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub remote_variation_id: Option<String>,
    pub remote_variation_version: Option<i64>,
}

impl From<ServiceEntity> for Service {
    fn from(entity: ServiceEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            duration_minutes: entity.duration_minutes,
            price: entity.price,
            remote_variation_id: entity.remote_variation_id,
            remote_variation_version: entity.remote_variation_version,
        }
    }
}

/// Database row mapping for the bookings table.
#[derive(Debug, Clone, FromRow)]
pub struct BookingEntity {
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

impl From<BookingEntity> for Booking {
    fn from(entity: BookingEntity) -> Self {
        Self {
            id: entity.id,
            remote_booking_id: entity.remote_booking_id,
            remote_customer_id: entity.remote_customer_id,
            service_id: entity.service_id,
            staff_id: entity.staff_id,
            start_at: entity.start_at,
            end_at: entity.end_at,
            status: entity.status,
            customer_name: entity.customer_name,
            customer_email: entity.customer_email,
            customer_phone: entity.customer_phone,
            notes: entity.notes,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
