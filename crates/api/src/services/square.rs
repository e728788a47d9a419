//! Square REST client.
//!
//! Implements [`CommerceProvider`] over Square's v2 API. Every call carries
//! the `Square-Version` header; authorized calls add the bearer token the
//! caller resolved.

use async_trait::async_trait;
use domain::models::remote::{
    AvailabilitySearch, CatalogPage, CreateCustomer, CreateOrder, CreatePayment,
    CreateRemoteBooking, RemoteAvailability, RemoteBooking, RemoteCustomer, RemoteOrder,
    RemotePayment, TokenGrant, TokenRequest, TokenResponse,
};
use domain::services::{CommerceProvider, ProviderError, ProviderResult};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::SquareConfig;

/// Longest provider error text kept in an error message.
const MAX_ERROR_TEXT: usize = 300;

/// HTTP client for the Square API.
#[derive(Clone)]
pub struct SquareClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl std::fmt::Debug for SquareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl SquareClient {
    pub fn new(config: &SquareConfig) -> Result<Self, reqwest::Error> {
        Self::with_base_url(config, config.base_url())
    }

    pub fn with_base_url(config: &SquareConfig, base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, access_token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self
            .http
            .request(method, url)
            .header("Square-Version", &self.api_version)
            .header("Accept", "application/json");
        match access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> ProviderResult<T> {
        let response = builder.send().await.map_err(|e| transport_error(path, e))?;
        let status = response.status();
        tracing::debug!(path = %path, status = status.as_u16(), "Square response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            tracing::warn!(path = %path, status = status.as_u16(), error = %message, "Square request failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Decode(format!("{}: {}", path, e))
            }
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: Option<&str>,
        body: &Value,
    ) -> ProviderResult<T> {
        let builder = self.request(Method::POST, path, access_token).json(body);
        self.send(path, builder).await
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        tracing::warn!(path = %path, "Square request timed out");
        ProviderError::Timeout
    } else {
        ProviderError::Transport(format!("{}: {}", path, err))
    }
}

#[derive(Debug, Deserialize)]
struct SquareErrors {
    #[serde(default)]
    errors: Vec<SquareErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SquareErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Condenses a Square error body into one line.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<SquareErrors>(body) {
        let details: Vec<String> = parsed
            .errors
            .iter()
            .filter_map(|e| match (&e.code, &e.detail) {
                (Some(code), Some(detail)) => Some(format!("{}: {}", code, detail)),
                (Some(code), None) => Some(code.clone()),
                (None, Some(detail)) => Some(detail.clone()),
                (None, None) => None,
            })
            .collect();
        if !details.is_empty() {
            return details.join("; ");
        }
        if let Some(message) = parsed.message {
            return message;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_TEXT).collect()
    }
}

fn token_body(request: &TokenRequest) -> Value {
    let mut body = json!({
        "client_id": request.client_id,
        "client_secret": request.client_secret,
        "grant_type": request.grant.grant_type(),
    });
    match &request.grant {
        TokenGrant::AuthorizationCode { code } => body["code"] = json!(code),
        TokenGrant::RefreshToken { refresh_token } => {
            body["refresh_token"] = json!(refresh_token)
        }
    }
    if let Some(redirect_uri) = &request.redirect_uri {
        body["redirect_uri"] = json!(redirect_uri);
    }
    body
}

fn order_body(order: &CreateOrder) -> Value {
    json!({
        "idempotency_key": order.idempotency_key,
        "order": {
            "location_id": order.location_id,
            "line_items": order.line_items,
        }
    })
}

fn payment_body(payment: &CreatePayment) -> Value {
    let mut body = json!({
        "idempotency_key": payment.idempotency_key,
        "source_id": payment.source_id,
        "amount_money": payment.amount_money,
        "order_id": payment.order_id,
        "location_id": payment.location_id,
        "autocomplete": true,
    });
    if let Some(token) = &payment.verification_token {
        body["verification_token"] = json!(token);
    }
    if let Some(email) = &payment.buyer_email_address {
        body["buyer_email_address"] = json!(email);
    }
    body
}

fn customer_body(customer: &CreateCustomer) -> Value {
    let mut body = json!({
        "idempotency_key": customer.idempotency_key,
        "given_name": customer.given_name,
        "email_address": customer.email_address,
        "phone_number": customer.phone_number,
    });
    if let Some(family_name) = &customer.family_name {
        body["family_name"] = json!(family_name);
    }
    body
}

fn booking_body(booking: &CreateRemoteBooking) -> Value {
    let mut inner = json!({
        "location_id": booking.location_id,
        "customer_id": booking.customer_id,
        "start_at": booking.start_at.to_rfc3339(),
        "appointment_segments": [booking.segment],
    });
    if let Some(note) = &booking.customer_note {
        inner["customer_note"] = json!(note);
    }
    json!({
        "idempotency_key": booking.idempotency_key,
        "booking": inner,
    })
}

fn availability_body(search: &AvailabilitySearch) -> Value {
    json!({
        "query": {
            "filter": {
                "start_at_range": {
                    "start_at": search.start_at.to_rfc3339(),
                    "end_at": search.end_at.to_rfc3339(),
                },
                "location_id": search.location_id,
                "segment_filters": [
                    { "service_variation_id": search.service_variation_id }
                ],
            }
        }
    })
}

#[derive(Deserialize)]
struct OrderEnvelope {
    order: RemoteOrder,
}

#[derive(Deserialize)]
struct PaymentEnvelope {
    payment: RemotePayment,
}

#[derive(Deserialize)]
struct CustomerEnvelope {
    customer: RemoteCustomer,
}

#[derive(Deserialize)]
struct BookingEnvelope {
    booking: RemoteBooking,
}

#[derive(Deserialize)]
struct AvailabilityEnvelope {
    #[serde(default)]
    availabilities: Vec<RemoteAvailability>,
}

#[async_trait]
impl CommerceProvider for SquareClient {
    async fn request_token(&self, request: TokenRequest) -> ProviderResult<TokenResponse> {
        tracing::debug!(grant_type = request.grant.grant_type(), "Requesting Square token");
        self.post("/oauth2/token", None, &token_body(&request)).await
    }

    async fn list_catalog(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> ProviderResult<CatalogPage> {
        let path = "/v2/catalog/list";
        let mut query = vec![("types", "ITEM,IMAGE")];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let builder = self
            .request(Method::GET, path, Some(access_token))
            .query(&query);
        self.send(path, builder).await
    }

    async fn create_order(
        &self,
        access_token: &str,
        order: CreateOrder,
    ) -> ProviderResult<RemoteOrder> {
        let envelope: OrderEnvelope = self
            .post("/v2/orders", Some(access_token), &order_body(&order))
            .await?;
        Ok(envelope.order)
    }

    async fn create_payment(
        &self,
        access_token: &str,
        payment: CreatePayment,
    ) -> ProviderResult<RemotePayment> {
        let envelope: PaymentEnvelope = self
            .post("/v2/payments", Some(access_token), &payment_body(&payment))
            .await?;
        Ok(envelope.payment)
    }

    async fn create_customer(
        &self,
        access_token: &str,
        customer: CreateCustomer,
    ) -> ProviderResult<RemoteCustomer> {
        let envelope: CustomerEnvelope = self
            .post("/v2/customers", Some(access_token), &customer_body(&customer))
            .await?;
        Ok(envelope.customer)
    }

    async fn create_booking(
        &self,
        access_token: &str,
        booking: CreateRemoteBooking,
    ) -> ProviderResult<RemoteBooking> {
        let envelope: BookingEnvelope = self
            .post("/v2/bookings", Some(access_token), &booking_body(&booking))
            .await?;
        Ok(envelope.booking)
    }

    async fn search_availability(
        &self,
        access_token: &str,
        search: AvailabilitySearch,
    ) -> ProviderResult<Vec<RemoteAvailability>> {
        let envelope: AvailabilityEnvelope = self
            .post(
                "/v2/bookings/availability/search",
                Some(access_token),
                &availability_body(&search),
            )
            .await?;
        Ok(envelope.availabilities)
    }
}
