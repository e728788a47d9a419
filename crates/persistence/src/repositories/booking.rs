//! Service and booking repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{Booking, NewBooking, Service};
use domain::store::{BookingStore, StoreResult};

use crate::entities::{BookingEntity, ServiceEntity};
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for bookable services and bookings.
#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_service_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<ServiceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_service_by_id");
        let result = sqlx::query_as::<_, ServiceEntity>(
            r#"
            SELECT id, name, duration_minutes, price, remote_variation_id, remote_variation_version
            FROM services
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn insert(&self, booking: &NewBooking) -> Result<BookingEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_booking");
        let result = sqlx::query_as::<_, BookingEntity>(
            r#"
            INSERT INTO bookings (
                remote_booking_id, remote_customer_id, service_id, staff_id,
                start_at, end_at, status, customer_name, customer_email,
                customer_phone, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&booking.remote_booking_id)
        .bind(&booking.remote_customer_id)
        .bind(booking.service_id)
        .bind(&booking.staff_id)
        .bind(booking.start_at)
        .bind(booking.end_at)
        .bind(&booking.status)
        .bind(&booking.customer_name)
        .bind(&booking.customer_email)
        .bind(&booking.customer_phone)
        .bind(&booking.notes)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn set_status_by_remote_id(
        &self,
        remote_booking_id: &str,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("update_booking_status");
        let result = sqlx::query(
            r#"
            UPDATE bookings SET status = $2, updated_at = NOW()
            WHERE remote_booking_id = $1
            "#,
        )
        .bind(remote_booking_id)
        .bind(status)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

#[async_trait]
impl BookingStore for BookingRepository {
    async fn find_service(&self, service_id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self
            .find_service_by_id(service_id)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn create_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        Ok(self.insert(&booking).await.map_err(store_error)?.into())
    }

    async fn update_booking_status(
        &self,
        remote_booking_id: &str,
        status: &str,
    ) -> StoreResult<bool> {
        self.set_status_by_remote_id(remote_booking_id, status)
            .await
            .map_err(store_error)
    }
}
