// src/services/billing_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        policy::{ensure, require_role, Caller},
    },
    db::{garage_repo::SubscriptionActivation, BillingEventRepository, GarageRepository},
    models::{
        auth::{Account, Role},
        billing::{ActivateSubscriptionPayload, CheckoutPayload, CheckoutSessionResponse, PortalPayload},
        garage::Garage,
    },
    services::{
        stripe::{CheckoutRequest, PaymentProvider},
        webhook::{WebhookEvent, WebhookEventData, WebhookVerifier},
    },
};

/// Falha de cobrança de uma assinatura.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFailure {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub garage_id: Option<Uuid>,
}

/// Destino dos alertas de cobrança (e-mail, chat...). A assinatura continua ativa
/// até o provedor mandar `customer.subscription.updated/deleted`.
pub trait BillingAlertSink: Send + Sync {
    fn payment_failed(&self, failure: &PaymentFailure);
}

// Padrão: só registra no log
pub struct LogAlertSink;

impl BillingAlertSink for LogAlertSink {
    fn payment_failed(&self, failure: &PaymentFailure) {
        tracing::warn!(
            invoice_id = %failure.invoice_id,
            subscription_id = ?failure.subscription_id,
            customer_id = ?failure.customer_id,
            garage_id = ?failure.garage_id,
            "⚠️ Falha no pagamento da assinatura"
        );
    }
}

/// Efeito de um evento do provedor sobre as oficinas.
#[derive(Debug, Clone)]
pub enum BillingMutation {
    Activate { garage_id: Uuid, activation: SubscriptionActivation },
    Refresh { subscription_id: String, active: bool, ends_at: Option<DateTime<Utc>> },
    Clear { subscription_id: String },
    PaymentFailed(PaymentFailure),
    Ignore(&'static str),
}

/// Traduz um evento verificado na alteração a aplicar.
///
/// `fetched_period_end` é o fim de período lido do provedor para a assinatura
/// do evento, quando houver.
pub fn mutation_for(
    event: &WebhookEvent,
    fetched_period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BillingMutation {
    use crate::services::webhook::WebhookEventType as T;

    match (&event.event_type, &event.data) {
        (T::CheckoutSessionCompleted, WebhookEventData::CheckoutSession(session)) => {
            let Some(garage_id) = session.garage_id else {
                return BillingMutation::Ignore("checkout sem garageId no metadata");
            };
            // Sem o período do provedor, calcula pelo plano
            let ends_at = fetched_period_end.or_else(|| session.plan.map(|p| p.period_end_from(now)));
            BillingMutation::Activate {
                garage_id,
                activation: SubscriptionActivation {
                    plan: session.plan,
                    subscription_id: session.subscription_id.clone(),
                    customer_id: session.customer_id.clone(),
                    ends_at,
                },
            }
        }
        (T::SubscriptionUpdated, WebhookEventData::Subscription(sub)) => {
            BillingMutation::Refresh {
                subscription_id: sub.subscription_id.clone(),
                active: sub.status == "active",
                ends_at: sub.period_end,
            }
        }
        (T::SubscriptionDeleted, WebhookEventData::Subscription(sub)) => BillingMutation::Clear {
            subscription_id: sub.subscription_id.clone(),
        },
        (T::InvoicePaid, WebhookEventData::Invoice(invoice)) => match &invoice.subscription_id {
            Some(subscription_id) => BillingMutation::Refresh {
                subscription_id: subscription_id.clone(),
                active: true,
                ends_at: fetched_period_end.or(invoice.period_end),
            },
            None => BillingMutation::Ignore("fatura sem assinatura"),
        },
        (T::InvoicePaymentFailed, WebhookEventData::Invoice(invoice)) => {
            BillingMutation::PaymentFailed(PaymentFailure {
                invoice_id: invoice.invoice_id.clone(),
                subscription_id: invoice.subscription_id.clone(),
                customer_id: invoice.customer_id.clone(),
                garage_id: None,
            })
        }
        _ => BillingMutation::Ignore("evento não tratado"),
    }
}

#[derive(Clone)]
pub struct BillingService {
    garage_repo: GarageRepository,
    event_repo: BillingEventRepository,
    provider: Option<Arc<dyn PaymentProvider>>,
    verifier: Option<WebhookVerifier>,
    alerts: Arc<dyn BillingAlertSink>,
    app_url: String,
    manual_activation: bool,
    pool: PgPool,
}

impl BillingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        garage_repo: GarageRepository,
        event_repo: BillingEventRepository,
        provider: Option<Arc<dyn PaymentProvider>>,
        verifier: Option<WebhookVerifier>,
        alerts: Arc<dyn BillingAlertSink>,
        app_url: String,
        manual_activation: bool,
        pool: PgPool,
    ) -> Self {
        Self {
            garage_repo,
            event_repo,
            provider,
            verifier,
            alerts,
            app_url,
            manual_activation,
            pool,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn PaymentProvider>, AppError> {
        self.provider.as_ref().ok_or(AppError::NotConfigured("STRIPE_SECRET_KEY"))
    }

    // Só o dono da oficina paga a assinatura dela
    async fn owned_garage(&self, caller: &Caller, garage_id: Uuid) -> Result<Garage, AppError> {
        require_role(caller, Role::Owner)?;

        let garage = self
            .garage_repo
            .find_by_id(&self.pool, garage_id)
            .await?
            .ok_or(AppError::GarageNotFound)?;

        ensure(caller.is_garage_owner(garage.owner_id))?;
        Ok(garage)
    }

    pub async fn create_checkout_session(
        &self,
        owner: &Account,
        payload: &CheckoutPayload,
    ) -> Result<CheckoutSessionResponse, AppError> {
        let caller = Caller::from(owner);
        let garage = self.owned_garage(&caller, payload.garage_id).await?;
        let provider = self.provider()?;

        let request = CheckoutRequest {
            garage_id: garage.id,
            owner_id: owner.id,
            plan: payload.plan,
            customer_email: garage.stripe_customer_id.is_none().then(|| owner.email.clone()),
            customer_id: garage.stripe_customer_id,
            success_url: format!(
                "{}/owner/dashboard?subscription=success&garageId={}&plan={}",
                self.app_url,
                garage.id,
                payload.plan.as_str()
            ),
            cancel_url: format!("{}/owner/subscription?garageId={}&canceled=true", self.app_url, garage.id),
        };

        let session = provider.create_checkout_session(&request).await?;

        tracing::info!(garage_id = %garage.id, plan = payload.plan.as_str(), session_id = %session.session_id, "💳 Checkout iniciado");
        Ok(CheckoutSessionResponse { session_id: session.session_id, url: session.url })
    }

    pub async fn create_portal_session(&self, caller: &Caller, payload: &PortalPayload) -> Result<String, AppError> {
        let garage = self.owned_garage(caller, payload.garage_id).await?;
        let customer_id = garage.stripe_customer_id.as_deref().ok_or(AppError::NoBillingAccount)?;

        let return_url = format!("{}/owner/dashboard", self.app_url);
        self.provider()?.create_portal_session(customer_id, &return_url).await
    }

    /// Ativa sem passar pelo provedor. Só existe com BILLING_MANUAL_ACTIVATION=true.
    pub async fn activate_manually(
        &self,
        caller: &Caller,
        payload: &ActivateSubscriptionPayload,
    ) -> Result<Garage, AppError> {
        if !self.manual_activation {
            return Err(AppError::ManualActivationDisabled);
        }

        let garage = self
            .garage_repo
            .find_by_id(&self.pool, payload.garage_id)
            .await?
            .ok_or(AppError::GarageNotFound)?;
        ensure(caller.can_manage_garage(&garage))?;

        let activation = SubscriptionActivation {
            plan: Some(payload.plan),
            ends_at: Some(payload.plan.period_end_from(Utc::now())),
            ..Default::default()
        };

        let garage = self
            .garage_repo
            .activate_subscription(&self.pool, garage.id, &activation)
            .await?
            .ok_or(AppError::GarageNotFound)?;

        tracing::warn!(garage_id = %garage.id, by = %caller.id, plan = payload.plan.as_str(), "Assinatura ativada manualmente, sem pagamento");
        Ok(garage)
    }

    /// Processa um webhook do provedor. A assinatura é verificada antes de
    /// qualquer leitura do corpo; cada evento é aplicado no máximo uma vez.
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let verifier = self.verifier.as_ref().ok_or(AppError::NotConfigured("STRIPE_WEBHOOK_SECRET"))?;
        let signature = signature
            .ok_or_else(|| AppError::InvalidWebhookSignature("cabeçalho Stripe-Signature ausente".into()))?;

        // A rejeição é registrada em `warn` na conversão para ApiError
        let event = verifier.verify_and_parse(payload, signature, Utc::now())?;

        if self.event_repo.is_processed(&self.pool, &event.id).await? {
            tracing::info!(event_id = %event.id, "Webhook repetido ignorado");
            return Ok(());
        }

        // Falha aqui vira 500 e o provedor reenvia o evento
        let fetched_period_end = match (event.subscription_to_fetch(), &self.provider) {
            (Some(subscription_id), Some(provider)) => provider.get_subscription(subscription_id).await?.period_end(),
            _ => None,
        };

        let mutation = mutation_for(&event, fetched_period_end, Utc::now());

        let mut tx = self.pool.begin().await?;

        if !self.event_repo.record(&mut *tx, &event.id, event.event_type.as_str()).await? {
            tracing::info!(event_id = %event.id, "Webhook já aplicado por outra requisição");
            return Ok(());
        }

        self.apply(&mut tx, mutation, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mutation: BillingMutation,
        event: &WebhookEvent,
    ) -> Result<(), AppError> {
        match mutation {
            BillingMutation::Activate { garage_id, activation } => {
                match self.garage_repo.activate_subscription(&mut **tx, garage_id, &activation).await? {
                    Some(garage) => tracing::info!(
                        garage_id = %garage.id,
                        plan = ?garage.subscription_plan,
                        ends_at = ?garage.subscription_ends_at,
                        "✅ Assinatura ativada"
                    ),
                    None => tracing::warn!(garage_id = %garage_id, event_id = %event.id, "Checkout para oficina inexistente"),
                }
            }
            BillingMutation::Refresh { subscription_id, active, ends_at } => {
                match self
                    .garage_repo
                    .refresh_subscription(&mut **tx, &subscription_id, active, ends_at)
                    .await?
                {
                    Some(garage) => tracing::info!(garage_id = %garage.id, active, "Assinatura atualizada"),
                    None => tracing::debug!(subscription_id = %subscription_id, "Assinatura sem oficina vinculada"),
                }
            }
            BillingMutation::Clear { subscription_id } => {
                match self.garage_repo.clear_subscription(&mut **tx, &subscription_id).await? {
                    Some(garage) => tracing::info!(garage_id = %garage.id, "Assinatura encerrada"),
                    None => tracing::debug!(subscription_id = %subscription_id, "Assinatura sem oficina vinculada"),
                }
            }
            BillingMutation::PaymentFailed(mut failure) => {
                if let Some(subscription_id) = failure.subscription_id.as_deref() {
                    failure.garage_id = self
                        .garage_repo
                        .find_by_subscription_id(&mut **tx, subscription_id)
                        .await?
                        .map(|g| g.id);
                }
                self.alerts.payment_failed(&failure);
            }
            BillingMutation::Ignore(reason) => {
                tracing::info!(event_id = %event.id, event_type = event.event_type.as_str(), reason, "Webhook sem efeito");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::garage::SubscriptionPlan,
        services::webhook::{CheckoutSessionData, InvoiceData, SubscriptionData, WebhookEventType},
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn event(event_type: WebhookEventType, data: WebhookEventData) -> WebhookEvent {
        WebhookEvent { id: "evt_1".into(), event_type, data }
    }

    fn checkout(garage_id: Option<Uuid>, plan: Option<SubscriptionPlan>) -> WebhookEvent {
        event(
            WebhookEventType::CheckoutSessionCompleted,
            WebhookEventData::CheckoutSession(CheckoutSessionData {
                session_id: "cs_1".into(),
                customer_id: Some("cus_1".into()),
                subscription_id: Some("sub_1".into()),
                garage_id,
                plan,
            }),
        )
    }

    fn subscription(event_type: WebhookEventType, status: &str) -> WebhookEvent {
        event(
            event_type,
            WebhookEventData::Subscription(SubscriptionData {
                subscription_id: "sub_1".into(),
                status: status.into(),
                period_end: Some(now()),
            }),
        )
    }

    #[test]
    fn checkout_activates_with_provider_period_end() {
        let garage_id = Uuid::new_v4();
        let period_end = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();
        match mutation_for(&checkout(Some(garage_id), Some(SubscriptionPlan::Monthly)), Some(period_end), now()) {
            BillingMutation::Activate { garage_id: id, activation } => {
                assert_eq!(id, garage_id);
                assert_eq!(activation.plan, Some(SubscriptionPlan::Monthly));
                assert_eq!(activation.subscription_id.as_deref(), Some("sub_1"));
                assert_eq!(activation.customer_id.as_deref(), Some("cus_1"));
                assert_eq!(activation.ends_at, Some(period_end));
            }
            other => panic!("mutação inesperada: {other:?}"),
        }
    }

    #[test]
    fn checkout_without_provider_period_uses_the_plan() {
        let mutation = mutation_for(&checkout(Some(Uuid::new_v4()), Some(SubscriptionPlan::Yearly)), None, now());
        match mutation {
            BillingMutation::Activate { activation, .. } => {
                assert_eq!(activation.ends_at, Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
            }
            other => panic!("mutação inesperada: {other:?}"),
        }
    }

    #[test]
    fn checkout_without_garage_metadata_is_ignored() {
        assert!(matches!(
            mutation_for(&checkout(None, Some(SubscriptionPlan::Monthly)), None, now()),
            BillingMutation::Ignore(_)
        ));
    }

    #[test]
    fn subscription_update_tracks_provider_status() {
        match mutation_for(&subscription(WebhookEventType::SubscriptionUpdated, "past_due"), None, now()) {
            BillingMutation::Refresh { active, ends_at, .. } => {
                assert!(!active);
                assert_eq!(ends_at, Some(now()));
            }
            other => panic!("mutação inesperada: {other:?}"),
        }
        assert!(matches!(
            mutation_for(&subscription(WebhookEventType::SubscriptionUpdated, "active"), None, now()),
            BillingMutation::Refresh { active: true, .. }
        ));
    }

    #[test]
    fn late_subscription_created_does_not_deactivate_a_paid_garage() {
        // Entregue depois do checkout, ainda com o status inicial do provedor
        let late = event(
            WebhookEventType::from("customer.subscription.created"),
            WebhookEventData::Other,
        );
        assert!(matches!(mutation_for(&late, None, now()), BillingMutation::Ignore(_)));
    }

    #[test]
    fn subscription_deletion_clears_the_garage() {
        assert!(matches!(
            mutation_for(&subscription(WebhookEventType::SubscriptionDeleted, "canceled"), None, now()),
            BillingMutation::Clear { ref subscription_id } if subscription_id == "sub_1"
        ));
    }

    #[test]
    fn paid_invoice_reactivates_and_failed_invoice_alerts() {
        let invoice = |event_type| {
            event(
                event_type,
                WebhookEventData::Invoice(InvoiceData {
                    invoice_id: "in_1".into(),
                    customer_id: Some("cus_1".into()),
                    subscription_id: Some("sub_1".into()),
                    period_end: None,
                }),
            )
        };

        assert!(matches!(
            mutation_for(&invoice(WebhookEventType::InvoicePaid), Some(now()), now()),
            BillingMutation::Refresh { active: true, ends_at: Some(_), .. }
        ));
        match mutation_for(&invoice(WebhookEventType::InvoicePaymentFailed), None, now()) {
            BillingMutation::PaymentFailed(failure) => {
                assert_eq!(failure.invoice_id, "in_1");
                assert_eq!(failure.subscription_id.as_deref(), Some("sub_1"));
            }
            other => panic!("mutação inesperada: {other:?}"),
        }
    }

    #[test]
    fn unknown_events_do_nothing() {
        let e = event(WebhookEventType::Unknown("customer.created".into()), WebhookEventData::Other);
        assert!(matches!(mutation_for(&e, None, now()), BillingMutation::Ignore(_)));
    }
}
