// src/services/webhook.rs
//
// Verificação e parsing dos webhooks do Stripe.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::garage::SubscriptionPlan,
    services::stripe::{from_unix, StripeSubscription},
};

// Janela aceita entre o timestamp assinado e o relógio local
const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    CheckoutSessionCompleted,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentFailed,
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            // Os dois nomes aparecem conforme a versão da API
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl WebhookEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: WebhookEventType,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone)]
pub enum WebhookEventData {
    CheckoutSession(CheckoutSessionData),
    Subscription(SubscriptionData),
    Invoice(InvoiceData),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionData {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    // Vêm do metadata gravado na criação da sessão
    pub garage_id: Option<Uuid>,
    pub plan: Option<SubscriptionPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionData {
    pub subscription_id: String,
    pub status: String,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceData {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Assinatura que precisa ser consultada no provedor para saber o fim do período.
    pub fn subscription_to_fetch(&self) -> Option<&str> {
        match &self.data {
            WebhookEventData::CheckoutSession(s) => s.subscription_id.as_deref(),
            WebhookEventData::Invoice(i) if self.event_type == WebhookEventType::InvoicePaid => {
                i.subscription_id.as_deref()
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Verifica o cabeçalho `Stripe-Signature` e só então interpreta o corpo.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, AppError> {
        self.verify_signature(payload, signature, now)?;

        let raw: RawStripeEvent =
            serde_json::from_slice(payload).map_err(|e| AppError::MalformedBody(e.to_string()))?;

        tracing::debug!(event_id = %raw.id, event_type = %raw.event_type, "Webhook verificado");

        let event_type = WebhookEventType::from(raw.event_type.as_str());
        let data = parse_event_data(&event_type, raw.data.object)?;

        Ok(WebhookEvent { id: raw.id, event_type, data })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let invalid = |reason: &str| AppError::InvalidWebhookSignature(reason.to_string());

        // Formato: t=timestamp,v1=assinatura[,v1=...]
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => candidates.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| invalid("timestamp ausente"))?;
        if candidates.is_empty() {
            return Err(invalid("assinatura v1 ausente"));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AppError::InternalServerError(anyhow::anyhow!("chave HMAC inválida")))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !candidates.iter().any(|c| constant_time_eq(c.as_bytes(), expected.as_bytes())) {
            return Err(invalid("assinatura não confere"));
        }

        let ts: i64 = timestamp.parse().map_err(|_| invalid("timestamp inválido"))?;
        if (now.timestamp() - ts).abs() > TOLERANCE_SECS {
            return Err(invalid("timestamp fora da janela de tolerância"));
        }

        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn parse_event_data(event_type: &WebhookEventType, object: serde_json::Value) -> Result<WebhookEventData, AppError> {
    let malformed = |e: serde_json::Error| AppError::MalformedBody(e.to_string());

    match event_type {
        WebhookEventType::CheckoutSessionCompleted => {
            let session: RawCheckoutSession = serde_json::from_value(object).map_err(malformed)?;
            Ok(WebhookEventData::CheckoutSession(CheckoutSessionData {
                session_id: session.id,
                customer_id: session.customer,
                subscription_id: session.subscription,
                garage_id: session.metadata.get("garageId").and_then(|v| v.parse().ok()),
                plan: session.metadata.get("plan").and_then(|v| v.parse().ok()),
            }))
        }
        WebhookEventType::SubscriptionUpdated | WebhookEventType::SubscriptionDeleted => {
            let sub: StripeSubscription = serde_json::from_value(object).map_err(malformed)?;
            Ok(WebhookEventData::Subscription(SubscriptionData {
                period_end: sub.period_end(),
                subscription_id: sub.id,
                status: sub.status,
            }))
        }
        WebhookEventType::InvoicePaid | WebhookEventType::InvoicePaymentFailed => {
            let inv: RawInvoice = serde_json::from_value(object).map_err(malformed)?;
            let subscription_id = inv.subscription.or_else(|| {
                inv.parent
                    .and_then(|p| p.subscription_details)
                    .and_then(|d| d.subscription)
            });
            Ok(WebhookEventData::Invoice(InvoiceData {
                invoice_id: inv.id,
                customer_id: inv.customer,
                subscription_id,
                period_end: inv.period_end.and_then(from_unix),
            }))
        }
        WebhookEventType::Unknown(_) => Ok(WebhookEventData::Other),
    }
}

// --- Formato bruto do Stripe ---

#[derive(Debug, Deserialize)]
struct RawStripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    parent: Option<RawInvoiceParent>,
    #[serde(default)]
    period_end: Option<i64>,
}

// API 2025+: a assinatura da fatura fica em parent.subscription_details
#[derive(Debug, Deserialize)]
struct RawInvoiceParent {
    subscription_details: Option<RawSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionDetails {
    subscription: Option<String>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Gera um cabeçalho `Stripe-Signature` válido para o corpo.
    pub fn sign(secret: &str, payload: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }
}
