// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::i18n::I18nStore,
    db::{
        AccountRepository, AdminRepository, AppointmentRepository, BillingEventRepository,
        GarageRepository,
    },
    models::appointment::TransitionPolicy,
    services::{
        admin_service::AdminService,
        appointment_service::AppointmentService,
        auth::AuthService,
        billing_service::{BillingService, LogAlertSink},
        garage_service::GarageService,
        stripe::{PaymentProvider, StripeProvider},
        upload_service::UploadService,
        webhook::WebhookVerifier,
    },
};

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub monthly_price_id: Option<String>,
    pub yearly_price_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub upload_preset: String,
}

// Conta ADMIN criada na inicialização, se ainda não existir
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Configuração lida do ambiente (`.env` incluído).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub app_url: String,
    pub transition_policy: TransitionPolicy,
    pub stripe: Option<StripeSettings>,
    pub stripe_webhook_secret: Option<String>,
    pub manual_activation: bool,
    pub cloudinary: Option<CloudinarySettings>,
    pub admin: Option<AdminBootstrap>,
}

// Variável opcional: ausente ou vazia vira None
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(key: &str) -> anyhow::Result<String> {
    optional(key).with_context(|| format!("{key} deve ser definida"))
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} inválida ({raw}): {e}")),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let stripe = optional("STRIPE_SECRET_KEY").map(|secret_key| StripeSettings {
            secret_key,
            monthly_price_id: optional("STRIPE_MONTHLY_PRICE_ID"),
            yearly_price_id: optional("STRIPE_YEARLY_PRICE_ID"),
        });

        let cloudinary = match (optional("CLOUDINARY_CLOUD_NAME"), optional("CLOUDINARY_UPLOAD_PRESET")) {
            (Some(cloud_name), Some(upload_preset)) => Some(CloudinarySettings { cloud_name, upload_preset }),
            _ => None,
        };

        let admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                email,
                password,
                name: optional("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 5)?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_days: parsed("JWT_TTL_DAYS", 7)?,
            app_url: optional("APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            transition_policy: parsed("APPOINTMENT_TRANSITIONS", TransitionPolicy::Strict)?,
            stripe,
            stripe_webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            manual_activation: parsed("BILLING_MANUAL_ACTIVATION", false)?,
            cloudinary,
            admin,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub i18n_store: Arc<I18nStore>,
    pub auth_service: AuthService,
    pub garage_service: GarageService,
    pub appointment_service: AppointmentService,
    pub billing_service: BillingService,
    pub admin_service: AdminService,
    pub upload_service: UploadService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("falha ao conectar no banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Self::build(db_pool, settings)
    }

    /// Monta o gráfico de dependências sobre um pool já criado.
    pub fn build(db_pool: PgPool, settings: Settings) -> anyhow::Result<Self> {
        let i18n_store = Arc::new(I18nStore::load()?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("falha ao criar o cliente HTTP")?;

        let account_repo = AccountRepository::new(db_pool.clone());
        let garage_repo = GarageRepository::new(db_pool.clone());
        let appointment_repo = AppointmentRepository::new(db_pool.clone());
        let admin_repo = AdminRepository::new(db_pool.clone());

        let auth_service = AuthService::new(
            account_repo,
            settings.jwt_secret.clone(),
            settings.jwt_ttl_days,
            db_pool.clone(),
        );

        let garage_service = GarageService::new(garage_repo.clone(), appointment_repo.clone(), db_pool.clone());

        let appointment_service = AppointmentService::new(
            appointment_repo,
            garage_repo.clone(),
            settings.transition_policy,
            db_pool.clone(),
        );

        let provider: Option<Arc<dyn PaymentProvider>> = settings.stripe.as_ref().map(|stripe| {
            Arc::new(StripeProvider::new(http.clone(), stripe.clone())) as Arc<dyn PaymentProvider>
        });
        if provider.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY ausente: checkout e portal ficam indisponíveis");
        }

        let billing_service = BillingService::new(
            garage_repo,
            BillingEventRepository::new(),
            provider,
            settings.stripe_webhook_secret.clone().map(WebhookVerifier::new),
            Arc::new(LogAlertSink),
            settings.app_url.clone(),
            settings.manual_activation,
            db_pool.clone(),
        );

        let admin_service = AdminService::new(admin_repo);
        let upload_service = UploadService::new(http, settings.cloudinary.clone());

        Ok(Self {
            db_pool,
            i18n_store,
            auth_service,
            garage_service,
            appointment_service,
            billing_service,
            admin_service,
            upload_service,
        })
    }
}
