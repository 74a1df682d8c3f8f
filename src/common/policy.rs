// src/common/policy.rs
//
// Regras de autorização compartilhadas por todos os serviços.

use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        appointment::AppointmentDetail,
        auth::{Account, Role},
        garage::Garage,
    },
};

/// Identidade já resolvida de quem faz a requisição.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl From<&Account> for Caller {
    fn from(account: &Account) -> Self {
        Self { id: account.id, role: account.role }
    }
}

impl Caller {
    pub fn is_self(&self, account_id: Uuid) -> bool {
        self.id == account_id
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    // Só uma conta OWNER pode ser dona de oficina
    pub fn is_garage_owner(&self, garage_owner_id: Uuid) -> bool {
        self.has_role(Role::Owner) && self.is_self(garage_owner_id)
    }

    /// Editar, excluir e ver uma oficina oculta.
    pub fn can_manage_garage(&self, garage: &Garage) -> bool {
        self.is_garage_owner(garage.owner_id) || self.is_admin()
    }

    /// Ler e excluir um agendamento: o solicitante, o dono da oficina ou o ADMIN.
    pub fn can_access_appointment(&self, appointment: &AppointmentDetail) -> bool {
        (self.has_role(Role::User) && self.is_self(appointment.appointment.user_id))
            || self.is_garage_owner(appointment.garage_owner_id)
            || self.is_admin()
    }

    /// Responder (orçamento / status): o dono da oficina ou o ADMIN.
    pub fn can_respond_to(&self, appointment: &AppointmentDetail) -> bool {
        self.is_garage_owner(appointment.garage_owner_id) || self.is_admin()
    }
}

/// Converte uma checagem em `Forbidden`.
pub fn ensure(allowed: bool) -> Result<(), AppError> {
    if allowed { Ok(()) } else { Err(AppError::Forbidden) }
}

pub fn require_role(caller: &Caller, role: Role) -> Result<(), AppError> {
    ensure(caller.has_role(role))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{
        appointment::{Appointment, AppointmentDetail, AppointmentStatus},
        auth::AccountSummary,
        garage::{Garage, GarageSummary, Specialty},
    };

    pub fn garage(owner_id: Uuid, approved: bool, subscribed: bool) -> Garage {
        Garage {
            id: Uuid::new_v4(),
            owner_id,
            name: "G1".into(),
            location: "1 Main St".into(),
            address: "1 Main St".into(),
            phone: None,
            description: None,
            specialties: vec![Specialty::Mechanic],
            photos: vec![],
            is_approved: approved,
            subscription_active: subscribed,
            subscription_plan: None,
            subscription_ends_at: None,
            stripe_customer_id: None,
            subscription_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn appointment(user_id: Uuid, garage_owner_id: Uuid, status: AppointmentStatus) -> AppointmentDetail {
        let garage_id = Uuid::new_v4();
        AppointmentDetail {
            appointment: Appointment {
                id: Uuid::new_v4(),
                user_id,
                garage_id,
                car_model: "Toyota Camry".into(),
                car_year: "2019".into(),
                description: "Revisão".into(),
                photos: vec![],
                status,
                cost_estimate: None,
                duration_days: None,
                appointment_date: None,
                owner_notes: None,
                confirmed_at: None,
                completed_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            user: AccountSummary { id: user_id, name: "alice".into(), email: "alice@example.com".into() },
            garage: GarageSummary { id: garage_id, name: "G1".into(), location: "1 Main St".into(), phone: None },
            garage_owner_id,
        }
    }
}
