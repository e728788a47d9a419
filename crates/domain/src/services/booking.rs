//! Booking availability and creation against the provider calendar.
//!
//! The provider is the system of record for bookings; local rows cache what
//! was booked through this site and are refreshed by booking webhooks.

use std::sync::Arc;

use chrono::Duration;
use shared::validation::normalize_phone;
use uuid::Uuid;
use validator::Validate;

use crate::error::CommerceError;
use crate::models::remote::{
    AppointmentSegment, AvailabilitySearch, CreateCustomer, CreateRemoteBooking,
};
use crate::models::{
    AvailabilityQuery, AvailabilitySlot, Booking, CreateBookingRequest, NewBooking, Service,
    SlotSegment,
};
use crate::services::oauth::OAuthManager;
use crate::services::provider::CommerceProvider;
use crate::store::BookingStore;

pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    provider: Arc<dyn CommerceProvider>,
    oauth: Arc<OAuthManager>,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        provider: Arc<dyn CommerceProvider>,
        oauth: Arc<OAuthManager>,
    ) -> Self {
        Self {
            bookings,
            provider,
            oauth,
        }
    }

    /// Loads a service that is bookable through the provider, returning it
    /// with its remote variation id.
    async fn synced_service(&self, service_id: Uuid) -> Result<(Service, String), CommerceError> {
        let service = self
            .bookings
            .find_service(service_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Service".to_string()))?;
        let variation_id = service
            .remote_variation_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(CommerceError::ServiceNotSynced(service_id))?;
        Ok((service, variation_id))
    }

    pub async fn get_availability(
        &self,
        query: AvailabilityQuery,
    ) -> Result<Vec<AvailabilitySlot>, CommerceError> {
        let (service, variation_id) = self.synced_service(query.service_id).await?;
        if query.start_at >= query.end_at {
            return Err(CommerceError::Validation(
                "start_at must be before end_at".to_string(),
            ));
        }

        let access_token = self.oauth.resolve_access_token().await?;
        let location_id = self.oauth.resolve_location_id().await?;
        let slots = self
            .provider
            .search_availability(
                &access_token,
                AvailabilitySearch {
                    location_id: location_id.clone(),
                    service_variation_id: variation_id,
                    start_at: query.start_at,
                    end_at: query.end_at,
                },
            )
            .await?;

        Ok(slots
            .into_iter()
            .map(|slot| AvailabilitySlot {
                start_at: slot.start_at,
                location_id: slot.location_id.unwrap_or_else(|| location_id.clone()),
                segments: slot
                    .appointment_segments
                    .into_iter()
                    .map(|segment| SlotSegment {
                        staff_id: segment.team_member_id,
                        variation_id: segment.service_variation_id,
                        variation_version: segment.service_variation_version,
                        duration_minutes: segment
                            .duration_minutes
                            .unwrap_or(service.duration_minutes),
                    })
                    .collect(),
            })
            .collect())
    }

    /// Creates the provider customer and booking, then caches the booking.
    /// Nothing is stored when either provider call fails.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<Booking, CommerceError> {
        request.validate()?;
        let (service, variation_id) = self.synced_service(request.service_id).await?;
        let phone = normalize_phone(&request.customer_phone)
            .ok_or_else(|| CommerceError::Validation("Invalid phone number".to_string()))?;

        let access_token = self.oauth.resolve_access_token().await?;
        let location_id = self.oauth.resolve_location_id().await?;

        let (given_name, family_name) = request.name_parts();
        let customer = self
            .provider
            .create_customer(
                &access_token,
                CreateCustomer {
                    idempotency_key: Uuid::new_v4().to_string(),
                    given_name,
                    family_name,
                    email_address: request.customer_email.clone(),
                    phone_number: phone.clone(),
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(service_id = %service.id, error = %e, "Provider customer creation failed");
                CommerceError::BookingFailed(e.to_string())
            })?;

        let remote = self
            .provider
            .create_booking(
                &access_token,
                CreateRemoteBooking {
                    idempotency_key: Uuid::new_v4().to_string(),
                    location_id,
                    customer_id: customer.id.clone(),
                    start_at: request.start_at,
                    customer_note: request.notes.clone(),
                    segment: AppointmentSegment {
                        duration_minutes: Some(service.duration_minutes),
                        service_variation_id: variation_id,
                        service_variation_version: request
                            .variation_version
                            .or(service.remote_variation_version),
                        team_member_id: request.staff_id.clone(),
                    },
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    service_id = %service.id,
                    remote_customer_id = %customer.id,
                    error = %e,
                    "Provider booking creation failed"
                );
                CommerceError::BookingFailed(e.to_string())
            })?;

        let booking = self
            .bookings
            .create_booking(NewBooking {
                remote_booking_id: remote.id,
                remote_customer_id: customer.id,
                service_id: service.id,
                staff_id: request.staff_id,
                start_at: request.start_at,
                end_at: request.start_at + Duration::minutes(i64::from(service.duration_minutes)),
                status: remote
                    .status
                    .map(|s| s.to_lowercase())
                    .unwrap_or_else(|| "pending".to_string()),
                customer_name: request.customer_name,
                customer_email: request.customer_email,
                customer_phone: phone,
                notes: request.notes,
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            remote_booking_id = %booking.remote_booking_id,
            service_id = %booking.service_id,
            "Booking created"
        );
        Ok(booking)
    }

    /// Applies a provider-reported status change to the cached booking.
    /// Bookings made elsewhere are not cached and are ignored.
    pub async fn apply_remote_update(
        &self,
        remote_booking_id: &str,
        status: &str,
    ) -> Result<bool, CommerceError> {
        let status = status.to_lowercase();
        let updated = self
            .bookings
            .update_booking_status(remote_booking_id, &status)
            .await?;
        if updated {
            tracing::info!(remote_booking_id, status = %status, "Booking status updated");
        } else {
            tracing::debug!(remote_booking_id, "Ignoring update for unknown booking");
        }
        Ok(updated)
    }
}
