//! Payment gateway clients
//!
//! [`HttpGateway`] talks to a Stripe-compatible checkout API.
//! [`SimulatedGateway`] keeps sessions in memory for development and tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{CheckoutRequest, CheckoutSession, PaymentStatus};
use crate::error::ServiceError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Checkout session {0} not found")]
    SessionNotFound(String),

    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SessionNotFound(_) => {
                ServiceError::PaymentVerificationFailed(err.to_string())
            }
            other => ServiceError::Gateway(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}

/// Checkout session as the Stripe API returns it
#[derive(Debug, Deserialize)]
struct RemoteSession {
    id: String,
    url: Option<String>,
    amount_total: Option<i64>,
    payment_status: String,
    payment_intent: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl RemoteSession {
    fn into_session(self) -> Result<CheckoutSession, GatewayError> {
        let reference = self
            .metadata
            .get("booking_id")
            .cloned()
            .or(self.client_reference_id)
            .ok_or_else(|| GatewayError::Malformed(format!("session {} has no booking reference", self.id)))?;
        let booking_id = Uuid::parse_str(&reference)
            .map_err(|e| GatewayError::Malformed(format!("booking reference {}: {}", reference, e)))?;

        let payment_status = match self.payment_status.as_str() {
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        };

        Ok(CheckoutSession {
            url: self.url.unwrap_or_default(),
            amount: self.amount_total.unwrap_or_default(),
            transaction_id: self.payment_intent,
            booking_id,
            payment_status,
            id: self.id,
        })
    }
}

/// Stripe-style REST client
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn parse(response: reqwest::Response, session_id: Option<&str>) -> Result<CheckoutSession, GatewayError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = session_id {
                return Err(GatewayError::SessionNotFound(id.to_string()));
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response.json::<RemoteSession>().await?.into_session()
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let booking_id = request.booking_id.to_string();
        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", booking_id.clone()),
            ("metadata[booking_id]", booking_id),
            ("line_items[0][quantity]", request.quantity.to_string()),
            ("line_items[0][price_data][currency]", request.currency.clone()),
            ("line_items[0][price_data][unit_amount]", request.unit_amount.to_string()),
            ("line_items[0][price_data][product_data][name]", request.description.clone()),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email", email.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let session = Self::parse(response, None).await?;
        tracing::info!(session_id = %session.id, booking_id = %session.booking_id, "Checkout session opened");
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::parse(response, Some(session_id)).await
    }
}

/// In-memory gateway. Sessions stay unpaid until [`complete_session`]
/// unless `auto_capture` is set.
///
/// [`complete_session`]: SimulatedGateway::complete_session
#[derive(Default)]
pub struct SimulatedGateway {
    sessions: RwLock<HashMap<String, CheckoutSession>>,
    auto_capture: bool,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session reports paid as soon as it is opened
    pub fn auto_capture() -> Self {
        Self {
            auto_capture: true,
            ..Self::default()
        }
    }

    /// Mark a session paid, as if the purchaser finished checkout
    pub async fn complete_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;
        capture(session);
        Ok(session.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn capture(session: &mut CheckoutSession) {
    session.payment_status = PaymentStatus::Paid;
    if session.transaction_id.is_none() {
        session.transaction_id = Some(format!("pi_sim_{}", Uuid::new_v4().simple()));
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let id = format!("cs_sim_{}", Uuid::new_v4().simple());
        let mut session = CheckoutSession {
            url: request.success_url.replace("{CHECKOUT_SESSION_ID}", &id),
            id: id.clone(),
            booking_id: request.booking_id,
            amount: request.total(),
            payment_status: PaymentStatus::Unpaid,
            transaction_id: None,
        };
        if self.auto_capture {
            capture(&mut session);
        }

        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            booking_id: Uuid::new_v4(),
            description: "Dhaka → Sylhet x2".into(),
            unit_amount: 750,
            quantity: 2,
            currency: "bdt".into(),
            customer_email: None,
            success_url: "http://localhost/ok?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "http://localhost/cancel".into(),
        }
    }

    #[tokio::test]
    async fn simulated_sessions_start_unpaid() {
        let gateway = SimulatedGateway::new();
        let session = gateway.create_checkout_session(&request()).await.unwrap();
        assert_eq!(session.amount, 1500);
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        assert!(session.url.ends_with(&session.id));

        let paid = gateway.complete_session(&session.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert!(paid.transaction_id.is_some());

        let fetched = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(fetched, paid);
    }

    #[tokio::test]
    async fn auto_capture_reports_paid() {
        let gateway = SimulatedGateway::auto_capture();
        let session = gateway.create_checkout_session(&request()).await.unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let gateway = SimulatedGateway::new();
        assert!(matches!(
            gateway.retrieve_session("cs_missing").await,
            Err(GatewayError::SessionNotFound(_))
        ));
    }

    #[test]
    fn remote_session_parses_stripe_shape() {
        let booking_id = Uuid::new_v4();
        let json = serde_json::json!({
            "id": "cs_test_1",
            "url": null,
            "amount_total": 1500,
            "payment_status": "paid",
            "payment_intent": "pi_123",
            "client_reference_id": null,
            "metadata": { "booking_id": booking_id.to_string() }
        });
        let remote: RemoteSession = serde_json::from_value(json).unwrap();
        let session = remote.into_session().unwrap();
        assert_eq!(session.booking_id, booking_id);
        assert_eq!(session.payment_status, PaymentStatus::Paid);
        assert_eq!(session.transaction_id.as_deref(), Some("pi_123"));
    }
}
