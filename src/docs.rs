// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::get_me,

        // --- Garages ---
        handlers::garages::list_garages,
        handlers::garages::get_garage,
        handlers::garages::create_garage,
        handlers::garages::update_garage,
        handlers::garages::delete_garage,

        // --- Appointments ---
        handlers::appointments::list_appointments,
        handlers::appointments::create_appointment,
        handlers::appointments::get_appointment,
        handlers::appointments::respond_appointment,
        handlers::appointments::cancel_appointment,
        handlers::appointments::delete_appointment,

        // --- Billing ---
        handlers::billing::create_checkout_session,
        handlers::billing::create_portal_session,
        handlers::billing::activate_subscription,
        handlers::billing::stripe_webhook,

        // --- Admin ---
        handlers::admin::list_all_garages,
        handlers::admin::set_garage_approval,
        handlers::admin::get_stats,

        // --- Uploads ---
        handlers::uploads::upload_file,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::Role,
            models::auth::Account,
            models::auth::AccountSummary,
            models::auth::RegisterAccountPayload,
            models::auth::LoginPayload,
            models::auth::AuthResponse,

            // --- Garages ---
            models::garage::Specialty,
            models::garage::SubscriptionPlan,
            models::garage::Garage,
            models::garage::GarageSummary,
            models::garage::GarageListing,
            models::garage::CreateGaragePayload,
            models::garage::UpdateGaragePayload,
            models::garage::ApprovalPayload,

            // --- Appointments ---
            models::appointment::AppointmentStatus,
            models::appointment::Appointment,
            models::appointment::AppointmentDetail,
            models::appointment::CreateAppointmentPayload,
            models::appointment::RespondAppointmentPayload,

            // --- Billing ---
            models::billing::CheckoutPayload,
            models::billing::PortalPayload,
            models::billing::ActivateSubscriptionPayload,
            models::billing::CheckoutSessionResponse,
            models::billing::RedirectResponse,
            models::billing::WebhookAck,
            models::billing::ActivationResponse,

            // --- Admin ---
            models::admin::AdminStats,
            models::admin::RoleCount,
            models::admin::StatusCount,
            models::admin::MonthlyCount,
        )
    ),
    tags(
        (name = "Auth", description = "Cadastro, login e conta atual"),
        (name = "Garages", description = "Diretório de oficinas"),
        (name = "Appointments", description = "Ciclo de vida dos agendamentos"),
        (name = "Billing", description = "Assinaturas e webhooks do Stripe"),
        (name = "Admin", description = "Aprovação de oficinas e indicadores"),
        (name = "Uploads", description = "Envio de fotos")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
