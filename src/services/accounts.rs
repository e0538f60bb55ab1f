use anyhow::Context;
use diesel::{BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    auth,
    config::AuthConfig,
    models::{AccountEntity, CreateAccountEntity},
    schema::accounts,
    types::{ProductType, Role},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Location {
    #[serde(rename = "ville", alias = "city", default)]
    pub city: Option<String>,
    #[serde(rename = "quartier", alias = "district", default)]
    pub district: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterReq {
    #[serde(rename = "nom", alias = "name")]
    pub name: String,
    #[serde(rename = "telephone", alias = "phone")]
    pub phone: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(rename = "localisation", alias = "location", default)]
    pub location: Location,
    #[serde(rename = "typeProduit", alias = "product_type", default)]
    pub product_type: Option<ProductType>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthPayload {
    pub token: String,
    pub user: AccountEntity,
}

fn validate(req: &RegisterReq) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if req.phone.trim().is_empty() {
        return Err(AppError::BadRequest("Phone number is required".into()));
    }
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if req.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

pub async fn register(
    conn: &mut AsyncPgConnection,
    req: RegisterReq,
    config: &AuthConfig,
) -> Result<AuthPayload, AppError> {
    validate(&req)?;
    let email = req.email.trim().to_lowercase();
    let phone = req.phone.trim().to_string();

    let taken: i64 = accounts::table
        .filter(accounts::email.eq(&email).or(accounts::phone.eq(&phone)))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check existing accounts")?;
    if taken > 0 {
        return Err(AppError::BadRequest(
            "An account with this email or phone already exists".into(),
        ));
    }

    let product_type = match req.role {
        Role::Supplier => req.product_type.map(|t| t.to_string()),
        Role::Buyer => None,
    };

    let account = diesel::insert_into(accounts::table)
        .values(CreateAccountEntity {
            name: req.name.trim().to_string(),
            phone,
            email,
            password_hash: auth::hash_password(&req.password)?,
            role: req.role.to_string(),
            city: req.location.city,
            district: req.location.district,
            product_type,
        })
        .returning(AccountEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|err| match err {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => AppError::BadRequest("An account with this email or phone already exists".into()),
            other => AppError::Other(anyhow::Error::new(other).context("Failed to create account")),
        })?;

    tracing::info!(account_id = account.id, role = %account.role, "Account registered");
    let token = auth::issue_token(account.id, req.role, config)?;
    Ok(AuthPayload {
        token,
        user: account,
    })
}

pub async fn login(
    conn: &mut AsyncPgConnection,
    req: LoginReq,
    config: &AuthConfig,
) -> Result<AuthPayload, AppError> {
    let account: Option<AccountEntity> = accounts::table
        .filter(accounts::email.eq(req.email.trim().to_lowercase()))
        .select(AccountEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get account")?;

    let account = match account {
        Some(account) if auth::verify_password(&req.password, &account.password_hash) => account,
        _ => return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into())),
    };

    let token = auth::issue_token(account.id, account.role()?, config)?;
    Ok(AuthPayload {
        token,
        user: account,
    })
}

pub async fn find_account(
    conn: &mut AsyncPgConnection,
    account_id: i32,
) -> Result<AccountEntity, AppError> {
    accounts::table
        .find(account_id)
        .select(AccountEntity::as_select())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get account")?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))
}
