// src/services/appointment_service.rs

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        policy::{ensure, require_role, Caller},
    },
    db::{
        appointment_repo::{AppointmentQuery, AppointmentUpdate},
        AppointmentRepository, GarageRepository,
    },
    models::{
        appointment::{
            Appointment, AppointmentDetail, AppointmentFilter, AppointmentStatus,
            CreateAppointmentPayload, RespondAppointmentPayload, TransitionPolicy,
        },
        auth::Role,
        garage::Garage,
    },
};

/// Aceita RFC 3339 ou uma data pura (`YYYY-MM-DD`, meia-noite UTC).
pub fn parse_appointment_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::field("appointmentDate", "invalid_date"))
}

/// Calcula o que uma resposta do dono muda no agendamento.
///
/// Os carimbos `confirmed_at`/`completed_at` só são definidos na primeira vez
/// em que o status chega a CONFIRMED/DONE.
pub fn plan_response(
    current: &Appointment,
    input: &RespondAppointmentPayload,
    policy: TransitionPolicy,
    now: DateTime<Utc>,
) -> Result<AppointmentUpdate, AppError> {
    let appointment_date = input
        .appointment_date
        .as_deref()
        .map(parse_appointment_date)
        .transpose()?;

    if let Some(next) = input.status {
        if policy == TransitionPolicy::Strict && !current.status.can_transition_to(next) {
            return Err(AppError::InvalidStatusTransition { from: current.status, to: next });
        }
    }

    let confirmed_at = match input.status {
        Some(AppointmentStatus::Confirmed)
            if current.status != AppointmentStatus::Confirmed && current.confirmed_at.is_none() =>
        {
            Some(now)
        }
        _ => None,
    };

    let completed_at = match input.status {
        Some(AppointmentStatus::Done)
            if current.status != AppointmentStatus::Done && current.completed_at.is_none() =>
        {
            Some(now)
        }
        _ => None,
    };

    Ok(AppointmentUpdate {
        cost_estimate: input.cost_estimate,
        duration_days: input.duration_days,
        appointment_date,
        owner_notes: input.owner_notes.clone(),
        status: input.status,
        confirmed_at,
        completed_at,
    })
}

/// Define quais agendamentos uma listagem pode devolver.
/// `garage` é a oficina do filtro `garageId`, quando informada.
pub fn resolve_list_scope(
    caller: &Caller,
    filter: &AppointmentFilter,
    garage: Option<&Garage>,
) -> Result<AppointmentQuery, AppError> {
    match caller.role {
        // O filtro de usuário é ignorado: USER só vê os próprios
        Role::User => Ok(AppointmentQuery {
            user_id: Some(caller.id),
            garage_id: filter.garage_id,
            owner_id: None,
        }),
        Role::Owner => match filter.garage_id {
            Some(garage_id) => {
                let owns = garage.is_some_and(|g| g.id == garage_id && caller.is_garage_owner(g.owner_id));
                ensure(owns)?;
                Ok(AppointmentQuery {
                    user_id: None,
                    garage_id: Some(garage_id),
                    owner_id: None,
                })
            }
            None => Ok(AppointmentQuery {
                user_id: None,
                garage_id: None,
                owner_id: Some(caller.id),
            }),
        },
        Role::Admin => Ok(AppointmentQuery {
            user_id: filter.user_id,
            garage_id: filter.garage_id,
            owner_id: None,
        }),
    }
}

#[derive(Clone)]
pub struct AppointmentService {
    appointment_repo: AppointmentRepository,
    garage_repo: GarageRepository,
    policy: TransitionPolicy,
    pool: PgPool,
}

impl AppointmentService {
    pub fn new(
        appointment_repo: AppointmentRepository,
        garage_repo: GarageRepository,
        policy: TransitionPolicy,
        pool: PgPool,
    ) -> Self {
        Self { appointment_repo, garage_repo, policy, pool }
    }

    pub async fn list(&self, caller: &Caller, filter: &AppointmentFilter) -> Result<Vec<AppointmentDetail>, AppError> {
        let garage = match (caller.role, filter.garage_id) {
            (Role::Owner, Some(garage_id)) => self.garage_repo.find_by_id(&self.pool, garage_id).await?,
            _ => None,
        };

        let query = resolve_list_scope(caller, filter, garage.as_ref())?;
        let rows = self.appointment_repo.list(&query).await?;
        Ok(rows.into_iter().map(AppointmentDetail::from).collect())
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<AppointmentDetail, AppError> {
        let detail = self.find_detail(id).await?;
        ensure(caller.can_access_appointment(&detail))?;
        Ok(detail)
    }

    // Só USER agenda, e só em oficina aprovada com assinatura ativa
    pub async fn create(&self, caller: &Caller, payload: CreateAppointmentPayload) -> Result<AppointmentDetail, AppError> {
        require_role(caller, Role::User)?;

        let garage = self
            .garage_repo
            .find_by_id(&self.pool, payload.garage_id)
            .await?
            .ok_or(AppError::GarageNotFound)?;

        if !garage.is_bookable() {
            tracing::debug!(garage_id = %garage.id, "Agendamento recusado: oficina indisponível");
            return Err(AppError::GarageUnavailable);
        }

        let row = self.appointment_repo.create(&self.pool, caller.id, &payload).await?;
        let detail = AppointmentDetail::from(row);

        tracing::info!(
            appointment_id = %detail.appointment.id,
            garage_id = %garage.id,
            user_id = %caller.id,
            "📅 Agendamento criado"
        );
        Ok(detail)
    }

    /// Resposta do dono: orçamento, data, notas e mudança de status.
    pub async fn respond(
        &self,
        caller: &Caller,
        id: Uuid,
        payload: RespondAppointmentPayload,
    ) -> Result<AppointmentDetail, AppError> {
        payload.validate()?;
        self.apply_response(caller, id, payload, |c, d| c.can_respond_to(d)).await
    }

    // Cancelar passa pelo mesmo caminho do respond
    pub async fn cancel(&self, caller: &Caller, id: Uuid) -> Result<AppointmentDetail, AppError> {
        let payload = RespondAppointmentPayload {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        self.apply_response(caller, id, payload, |c, d| c.can_access_appointment(d)).await
    }

    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        let detail = self.find_detail(id).await?;
        ensure(caller.can_access_appointment(&detail))?;

        let removed = self.appointment_repo.delete(&self.pool, id).await?;
        if removed == 0 {
            return Err(AppError::AppointmentNotFound);
        }

        tracing::info!(appointment_id = %id, by = %caller.id, "🗑️ Agendamento excluído");
        Ok(())
    }

    async fn find_detail(&self, id: Uuid) -> Result<AppointmentDetail, AppError> {
        self.appointment_repo
            .find_detail(&self.pool, id)
            .await?
            .map(AppointmentDetail::from)
            .ok_or(AppError::AppointmentNotFound)
    }

    // Lê com FOR UPDATE, valida a transição sobre o estado travado e grava
    async fn apply_response<F>(
        &self,
        caller: &Caller,
        id: Uuid,
        payload: RespondAppointmentPayload,
        allowed: F,
    ) -> Result<AppointmentDetail, AppError>
    where
        F: Fn(&Caller, &AppointmentDetail) -> bool,
    {
        let mut tx = self.pool.begin().await?;

        let current = self
            .appointment_repo
            .find_detail_for_update(&mut *tx, id)
            .await?
            .map(AppointmentDetail::from)
            .ok_or(AppError::AppointmentNotFound)?;

        ensure(allowed(caller, &current))?;

        let update = plan_response(&current.appointment, &payload, self.policy, Utc::now())?;
        let row = self.appointment_repo.apply_update(&mut *tx, id, &update).await?;

        tx.commit().await?;

        let updated = AppointmentDetail::from(row);
        if current.appointment.status != updated.appointment.status {
            tracing::info!(
                appointment_id = %id,
                from = %current.appointment.status,
                to = %updated.appointment.status,
                by = %caller.id,
                "Status do agendamento alterado"
            );
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::policy::fixtures;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use AppointmentStatus::*;

    fn at(status: AppointmentStatus) -> Appointment {
        fixtures::appointment(Uuid::new_v4(), Uuid::new_v4(), status).appointment
    }

    fn to(status: AppointmentStatus) -> RespondAppointmentPayload {
        RespondAppointmentPayload { status: Some(status), ..Default::default() }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn confirming_stamps_confirmed_at_and_keeps_quote() {
        let input = RespondAppointmentPayload {
            status: Some(Confirmed),
            cost_estimate: Some(Decimal::new(35000, 2)),
            duration_days: Some(2),
            ..Default::default()
        };
        let update = plan_response(&at(Pending), &input, TransitionPolicy::Strict, now()).unwrap();
        assert_eq!(update.status, Some(Confirmed));
        assert_eq!(update.confirmed_at, Some(now()));
        assert_eq!(update.completed_at, None);
        assert_eq!(update.cost_estimate, Some(Decimal::new(35000, 2)));
        assert_eq!(update.duration_days, Some(2));
    }

    #[test]
    fn completing_stamps_completed_at_once() {
        let mut current = at(Confirmed);
        current.confirmed_at = Some(now());
        let update = plan_response(&current, &to(Done), TransitionPolicy::Strict, now()).unwrap();
        assert_eq!(update.completed_at, Some(now()));
        assert_eq!(update.confirmed_at, None);
    }

    #[test]
    fn reconfirming_never_moves_the_stamp() {
        let mut current = at(Confirmed);
        current.confirmed_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let update = plan_response(&current, &to(Confirmed), TransitionPolicy::Strict, now()).unwrap();
        assert_eq!(update.confirmed_at, None);

        // Mesmo voltando de PENDING no modo permissivo
        let mut reopened = at(Pending);
        reopened.confirmed_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let update = plan_response(&reopened, &to(Confirmed), TransitionPolicy::Permissive, now()).unwrap();
        assert_eq!(update.confirmed_at, None);
    }

    #[test]
    fn strict_policy_rejects_leaving_a_terminal_state() {
        let err = plan_response(&at(Done), &to(Pending), TransitionPolicy::Strict, now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidStatusTransition { from: Done, to: Pending }));

        let err = plan_response(&at(Pending), &to(Done), TransitionPolicy::Strict, now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn permissive_policy_allows_manual_corrections() {
        let update = plan_response(&at(Cancelled), &to(Pending), TransitionPolicy::Permissive, now()).unwrap();
        assert_eq!(update.status, Some(Pending));
    }

    #[test]
    fn cancelling_done_is_rejected_in_strict_mode() {
        let err = plan_response(&at(Done), &to(Cancelled), TransitionPolicy::Strict, now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn quote_without_status_change_is_accepted_in_any_state() {
        let input = RespondAppointmentPayload {
            owner_notes: Some("Peça encomendada".into()),
            ..Default::default()
        };
        let update = plan_response(&at(Done), &input, TransitionPolicy::Strict, now()).unwrap();
        assert_eq!(update.status, None);
        assert_eq!(update.owner_notes.as_deref(), Some("Peça encomendada"));
    }

    #[test]
    fn invalid_date_fails_validation() {
        let input = RespondAppointmentPayload {
            appointment_date: Some("next tuesday".into()),
            ..Default::default()
        };
        let err = plan_response(&at(Pending), &input, TransitionPolicy::Strict, now()).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        assert_eq!(
            parse_appointment_date("2025-06-01").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_appointment_date("2025-06-01T09:30:00-03:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap()
        );
        assert!(parse_appointment_date("01/06/2025").is_err());
    }

    #[test]
    fn users_only_list_their_own_appointments() {
        let user = Caller { id: Uuid::new_v4(), role: Role::User };
        let filter = AppointmentFilter { user_id: Some(Uuid::new_v4()), garage_id: None };
        let scope = resolve_list_scope(&user, &filter, None).unwrap();
        assert_eq!(scope.user_id, Some(user.id));
    }

    #[test]
    fn owners_list_across_their_garages_or_one_they_own() {
        let owner = Caller { id: Uuid::new_v4(), role: Role::Owner };
        let scope = resolve_list_scope(&owner, &AppointmentFilter::default(), None).unwrap();
        assert_eq!(scope.owner_id, Some(owner.id));

        let mine = fixtures::garage(owner.id, true, true);
        let filter = AppointmentFilter { garage_id: Some(mine.id), user_id: None };
        let scope = resolve_list_scope(&owner, &filter, Some(&mine)).unwrap();
        assert_eq!(scope.garage_id, Some(mine.id));
        assert_eq!(scope.owner_id, None);
    }

    #[test]
    fn owners_cannot_list_someone_elses_garage() {
        let owner = Caller { id: Uuid::new_v4(), role: Role::Owner };
        let theirs = fixtures::garage(Uuid::new_v4(), true, true);
        let filter = AppointmentFilter { garage_id: Some(theirs.id), user_id: None };
        assert!(matches!(
            resolve_list_scope(&owner, &filter, Some(&theirs)),
            Err(AppError::Forbidden)
        ));
        // Oficina inexistente também é Forbidden
        assert!(matches!(resolve_list_scope(&owner, &filter, None), Err(AppError::Forbidden)));
    }

    #[test]
    fn admins_may_filter_freely() {
        let admin = Caller { id: Uuid::new_v4(), role: Role::Admin };
        let filter = AppointmentFilter { user_id: Some(Uuid::new_v4()), garage_id: Some(Uuid::new_v4()) };
        let scope = resolve_list_scope(&admin, &filter, None).unwrap();
        assert_eq!(scope.user_id, filter.user_id);
        assert_eq!(scope.garage_id, filter.garage_id);
    }
}
