// src/services/stripe.rs
//
// Cliente mínimo da API REST do Stripe (form-encoded, autenticação básica).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::{common::error::AppError, config::StripeSettings, models::garage::SubscriptionPlan};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Dados para abrir uma sessão de checkout de assinatura.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub garage_id: Uuid,
    pub owner_id: Uuid,
    pub plan: SubscriptionPlan,
    // Cliente já conhecido (reassinatura) ou e-mail para criar um novo
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Abstrai o provedor de pagamento para o serviço de billing.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, AppError>;

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, AppError>;

    async fn get_subscription(&self, subscription_id: &str) -> Result<StripeSubscription, AppError>;
}

#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
    settings: StripeSettings,
}

impl StripeProvider {
    pub fn new(client: Client, settings: StripeSettings) -> Self {
        Self { client, settings }
    }

    fn price_id(&self, plan: SubscriptionPlan) -> Result<&str, AppError> {
        let (price, key) = match plan {
            SubscriptionPlan::Monthly => (&self.settings.monthly_price_id, "STRIPE_MONTHLY_PRICE_ID"),
            SubscriptionPlan::Yearly => (&self.settings.yearly_price_id, "STRIPE_YEARLY_PRICE_ID"),
        };
        price.as_deref().ok_or(AppError::NotConfigured(key))
    }

    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<T, AppError> {
        let url = format!("{STRIPE_API_BASE}{endpoint}");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.settings.secret_key, Option::<&str>::None);

        if let Some(form_data) = form {
            request = request.form(form_data);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, endpoint, "Falha na requisição ao Stripe");
            AppError::ExternalService(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, endpoint, "Stripe respondeu com erro");
            return Err(AppError::ExternalService(format!("Stripe API error: {status}")));
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(error = %e, endpoint, "Resposta do Stripe ilegível");
            AppError::ExternalService(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, AppError> {
        let price_id = self.price_id(request.plan)?;
        let garage_id = request.garage_id.to_string();
        let owner_id = request.owner_id.to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            // Devolvidos no webhook checkout.session.completed
            ("metadata[garageId]", garage_id.as_str()),
            ("metadata[ownerId]", owner_id.as_str()),
            ("metadata[plan]", request.plan.as_str()),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
        ];
        match (&request.customer_id, &request.customer_email) {
            (Some(customer), _) => form.push(("customer", customer.as_str())),
            (None, Some(email)) => form.push(("customer_email", email.as_str())),
            (None, None) => {}
        }

        tracing::debug!(garage_id = %request.garage_id, plan = request.plan.as_str(), "Criando sessão de checkout");

        let session: StripeCheckoutSession = self
            .stripe_request(reqwest::Method::POST, "/checkout/sessions", Some(&form))
            .await?;

        let url = session
            .url
            .ok_or_else(|| AppError::ExternalService("sessão de checkout sem URL".into()))?;

        Ok(CheckoutSession { session_id: session.id, url })
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, AppError> {
        let form = [("customer", customer_id), ("return_url", return_url)];

        let session: StripePortalSession = self
            .stripe_request(reqwest::Method::POST, "/billing_portal/sessions", Some(&form))
            .await?;

        Ok(session.url)
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<StripeSubscription, AppError> {
        self.stripe_request(
            reqwest::Method::GET,
            &format!("/subscriptions/{subscription_id}"),
            None,
        )
        .await
    }
}

// --- Tipos de resposta do Stripe ---

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePortalSession {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<StripeList<StripeSubscriptionItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

/// Converte um timestamp Unix do Stripe.
pub fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

impl StripeSubscription {
    /// Fim do período atual. Versões novas da API só informam nos itens.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| {
                self.items
                    .as_ref()
                    .and_then(|items| items.data.iter().find_map(|i| i.current_period_end))
            })
            .and_then(from_unix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_end_falls_back_to_subscription_items() {
        let legacy: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1", "status": "active", "current_period_end": 1_750_000_000
        }))
        .unwrap();
        assert_eq!(legacy.period_end(), from_unix(1_750_000_000));

        let current: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "status": "past_due",
            "items": { "data": [{ "current_period_end": 1_760_000_000 }] }
        }))
        .unwrap();
        assert_eq!(current.period_end(), from_unix(1_760_000_000));
    }

    #[test]
    fn missing_price_id_is_a_configuration_error() {
        let provider = StripeProvider::new(
            Client::new(),
            StripeSettings {
                secret_key: "sk_test".into(),
                monthly_price_id: Some("price_m".into()),
                yearly_price_id: None,
            },
        );
        assert_eq!(provider.price_id(SubscriptionPlan::Monthly).unwrap(), "price_m");
        assert!(matches!(
            provider.price_id(SubscriptionPlan::Yearly),
            Err(AppError::NotConfigured("STRIPE_YEARLY_PRICE_ID"))
        ));
    }
}
