// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    config::AdminBootstrap,
    db::AccountRepository,
    models::auth::{Account, AuthResponse, Claims, LoginPayload, RegisterAccountPayload, Role},
};

#[derive(Clone)]
pub struct AuthService {
    account_repo: AccountRepository,
    jwt_secret: String,
    ttl_days: i64,
    pool: PgPool,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// bcrypt é CPU-bound: roda fora do runtime assíncrono
async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hashed)
}

impl AuthService {
    pub fn new(account_repo: AccountRepository, jwt_secret: String, ttl_days: i64, pool: PgPool) -> Self {
        Self { account_repo, jwt_secret, ttl_days, pool }
    }

    // Cadastro público (USER ou OWNER, já validado no payload)
    pub async fn register(&self, payload: RegisterAccountPayload) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&payload.email);

        if self.account_repo.find_by_email(&email).await?.is_some() {
            return Err(AppError::EmailAlreadyExists);
        }

        let password_hash = hash_password(&payload.password).await?;

        // A constraint UNIQUE cobre o cadastro concorrente com o mesmo e-mail
        let account = self
            .account_repo
            .create_account(
                &self.pool,
                &email,
                payload.name.trim(),
                &password_hash,
                payload.role,
            )
            .await?;

        tracing::info!(account_id = %account.id, role = %account.role, "Nova conta registrada");

        let token = self.create_token(&account)?;
        Ok(AuthResponse { token, account })
    }

    pub async fn login(&self, payload: LoginPayload) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&payload.email);

        // E-mail desconhecido e senha errada dão o mesmo erro
        let account = self
            .account_repo
            .find_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password = payload.password;
        let password_hash = account.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || verify(&password, &password_hash))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            tracing::debug!(account_id = %account.id, "Senha incorreta");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.create_token(&account)?;
        Ok(AuthResponse { token, account })
    }

    /// Resolve um token na conta atual. Conta removida também é `InvalidToken`.
    pub async fn validate_token(&self, token: &str) -> Result<Account, AppError> {
        let claims = self.decode_token(token)?;

        self.account_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;

        Ok(token_data.claims)
    }

    pub fn create_token(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(self.ttl_days);

        let claims = Claims {
            sub: account.id,
            role: account.role,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }

    /// Garante a conta ADMIN de bootstrap. Nunca altera uma conta existente.
    pub async fn ensure_admin(&self, bootstrap: &AdminBootstrap) -> Result<(), AppError> {
        let email = normalize_email(&bootstrap.email);

        if let Some(existing) = self.account_repo.find_by_email(&email).await? {
            if existing.role != Role::Admin {
                tracing::warn!(email = %email, role = %existing.role, "ADMIN_EMAIL pertence a uma conta que não é ADMIN");
            }
            return Ok(());
        }

        let password_hash = hash_password(&bootstrap.password).await?;
        if let Some(account) = self
            .account_repo
            .insert_if_absent(&email, &bootstrap.name, &password_hash, Role::Admin)
            .await?
        {
            tracing::info!(account_id = %account.id, "👤 Conta ADMIN criada");
        }

        Ok(())
    }
}
