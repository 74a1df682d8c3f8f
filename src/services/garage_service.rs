// src/services/garage_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        policy::{ensure, require_role, Caller},
    },
    db::{garage_repo::GarageQuery, AppointmentRepository, GarageRepository},
    models::{
        auth::Role,
        garage::{
            CreateGaragePayload, Garage, GarageFilter, GarageListing, Specialty, UpdateGaragePayload,
        },
    },
};

/// Aplica as regras de visibilidade da listagem ao filtro recebido.
///
/// - ADMIN vê tudo (o filtro de dono é opcional);
/// - OWNER vê as próprias oficinas com qualquer status; pedir as de outro
///   dono só devolve as públicas;
/// - anônimo e USER só veem oficinas aprovadas e com assinatura ativa.
pub fn resolve_listing_query(caller: Option<&Caller>, filter: &GarageFilter) -> GarageQuery {
    let specialty = filter.specialty.filter(|s| *s != Specialty::AllServices);

    match caller {
        Some(c) if c.is_admin() => GarageQuery {
            owner_id: filter.owner_id,
            specialty,
            visible_only: false,
        },
        Some(c) if c.has_role(Role::Owner) => {
            let owner_id = filter.owner_id.unwrap_or(c.id);
            GarageQuery {
                owner_id: Some(owner_id),
                specialty,
                visible_only: !c.is_self(owner_id),
            }
        }
        _ => GarageQuery {
            owner_id: filter.owner_id,
            specialty,
            visible_only: true,
        },
    }
}

/// Uma oficina fora do ar só é visível para o dono e para o ADMIN.
pub fn can_view(caller: Option<&Caller>, garage: &Garage) -> bool {
    garage.is_bookable() || caller.is_some_and(|c| c.can_manage_garage(garage))
}

#[derive(Clone)]
pub struct GarageService {
    garage_repo: GarageRepository,
    appointment_repo: AppointmentRepository,
    pool: PgPool,
}

impl GarageService {
    pub fn new(garage_repo: GarageRepository, appointment_repo: AppointmentRepository, pool: PgPool) -> Self {
        Self { garage_repo, appointment_repo, pool }
    }

    pub async fn list(&self, caller: Option<&Caller>, filter: &GarageFilter) -> Result<Vec<GarageListing>, AppError> {
        let query = resolve_listing_query(caller, filter);
        let rows = self.garage_repo.list(&query).await?;
        Ok(rows.into_iter().map(GarageListing::from).collect())
    }

    // Painel do ADMIN: todas as oficinas, independente de status
    pub async fn list_all(&self, caller: &Caller) -> Result<Vec<GarageListing>, AppError> {
        require_role(caller, Role::Admin)?;
        let rows = self.garage_repo.list(&GarageQuery::default()).await?;
        Ok(rows.into_iter().map(GarageListing::from).collect())
    }

    pub async fn get(&self, caller: Option<&Caller>, id: Uuid) -> Result<GarageListing, AppError> {
        let listing = self
            .garage_repo
            .find_listing(id)
            .await?
            .map(GarageListing::from)
            .ok_or(AppError::GarageNotFound)?;

        // Oculta: responde como inexistente
        if !can_view(caller, &listing.garage) {
            return Err(AppError::GarageNotFound);
        }

        Ok(listing)
    }

    pub async fn create(&self, caller: &Caller, payload: CreateGaragePayload) -> Result<Garage, AppError> {
        require_role(caller, Role::Owner)?;

        let garage = self.garage_repo.create(&self.pool, caller.id, &payload).await?;

        tracing::info!(garage_id = %garage.id, owner_id = %caller.id, "Oficina cadastrada, aguardando aprovação");
        Ok(garage)
    }

    pub async fn update(&self, caller: &Caller, id: Uuid, payload: UpdateGaragePayload) -> Result<Garage, AppError> {
        let garage = self.find_managed(caller, id).await?;

        self.garage_repo
            .update(&self.pool, garage.id, &payload)
            .await?
            .ok_or(AppError::GarageNotFound)
    }

    // Remove a oficina e todos os agendamentos dela, na mesma transação
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        let garage = self.find_managed(caller, id).await?;

        let mut tx = self.pool.begin().await?;

        let removed_appointments = self.appointment_repo.delete_by_garage(&mut *tx, garage.id).await?;
        let removed = self.garage_repo.delete(&mut *tx, garage.id).await?;
        if removed == 0 {
            return Err(AppError::GarageNotFound);
        }

        tx.commit().await?;

        tracing::info!(
            garage_id = %garage.id,
            by = %caller.id,
            removed_appointments,
            "🗑️ Oficina excluída"
        );
        Ok(())
    }

    pub async fn set_approval(&self, caller: &Caller, id: Uuid, approved: bool) -> Result<Garage, AppError> {
        require_role(caller, Role::Admin)?;

        let garage = self
            .garage_repo
            .set_approval(&self.pool, id, approved)
            .await?
            .ok_or(AppError::GarageNotFound)?;

        tracing::info!(garage_id = %garage.id, approved, "Aprovação de oficina alterada");
        Ok(garage)
    }

    async fn find_managed(&self, caller: &Caller, id: Uuid) -> Result<Garage, AppError> {
        let garage = self
            .garage_repo
            .find_by_id(&self.pool, id)
            .await?
            .ok_or(AppError::GarageNotFound)?;

        ensure(caller.can_manage_garage(&garage))?;
        Ok(garage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::policy::fixtures;

    fn caller(role: Role) -> Caller {
        Caller { id: Uuid::new_v4(), role }
    }

    #[test]
    fn anonymous_listing_only_shows_bookable_garages() {
        let query = resolve_listing_query(None, &GarageFilter::default());
        assert!(query.visible_only);
        assert_eq!(query.owner_id, None);

        let user = caller(Role::User);
        assert!(resolve_listing_query(Some(&user), &GarageFilter::default()).visible_only);
    }

    #[test]
    fn owner_sees_all_of_their_own_garages() {
        let owner = caller(Role::Owner);
        let query = resolve_listing_query(Some(&owner), &GarageFilter::default());
        assert_eq!(query.owner_id, Some(owner.id));
        assert!(!query.visible_only);
    }

    #[test]
    fn owner_asking_for_someone_else_only_gets_public_garages() {
        let owner = caller(Role::Owner);
        let other = Uuid::new_v4();
        let filter = GarageFilter { owner_id: Some(other), ..Default::default() };
        let query = resolve_listing_query(Some(&owner), &filter);
        assert_eq!(query.owner_id, Some(other));
        assert!(query.visible_only);
    }

    #[test]
    fn admin_sees_everything() {
        let admin = caller(Role::Admin);
        let query = resolve_listing_query(Some(&admin), &GarageFilter::default());
        assert_eq!(query, GarageQuery::default());
    }

    #[test]
    fn all_services_specialty_means_no_filter() {
        let filter = GarageFilter { specialty: Some(Specialty::AllServices), owner_id: None };
        assert_eq!(resolve_listing_query(None, &filter).specialty, None);

        let filter = GarageFilter { specialty: Some(Specialty::Electric), owner_id: None };
        assert_eq!(resolve_listing_query(None, &filter).specialty, Some(Specialty::Electric));
    }

    #[test]
    fn hidden_garage_is_only_visible_to_owner_and_admin() {
        let owner = caller(Role::Owner);
        let unapproved = fixtures::garage(owner.id, false, true);

        assert!(!can_view(None, &unapproved));
        assert!(!can_view(Some(&caller(Role::User)), &unapproved));
        assert!(!can_view(Some(&caller(Role::Owner)), &unapproved));
        assert!(can_view(Some(&owner), &unapproved));
        assert!(can_view(Some(&caller(Role::Admin)), &unapproved));

        let live = fixtures::garage(owner.id, true, true);
        assert!(can_view(None, &live));
    }

    #[sqlx::test]
    async fn delete_removes_the_garage_with_its_appointments(pool: PgPool) -> anyhow::Result<()> {
        use crate::db::fixtures as db;

        let garages = GarageRepository::new(pool.clone());
        let appointments = AppointmentRepository::new(pool.clone());
        let service = GarageService::new(garages.clone(), appointments.clone(), pool.clone());

        let owner = db::account(&pool, Role::Owner).await?;
        let user = db::account(&pool, Role::User).await?;
        let garage = db::garage(&pool, owner.id, "G1", true, true).await?;
        let booked = appointments.create(&pool, user.id, &db::appointment_payload(garage.id)).await?;

        // Outro dono não pode excluir
        let stranger = caller(Role::Owner);
        assert!(matches!(service.delete(&stranger, garage.id).await, Err(AppError::Forbidden)));

        service.delete(&Caller::from(&owner), garage.id).await?;

        assert!(garages.find_by_id(&pool, garage.id).await?.is_none());
        assert!(appointments.find_detail(&pool, booked.appointment.id).await?.is_none());
        assert!(matches!(
            service.delete(&Caller::from(&owner), garage.id).await,
            Err(AppError::GarageNotFound)
        ));
        Ok(())
    }
}
