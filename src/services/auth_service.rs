use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    config::JwtConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    models::{ROLE_CUSTOMER, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        email,
        password,
        name,
    } = payload;
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let password_hash = hash_password(&password)?;
    let now = Utc::now();
    let user = UserActive {
        id: NotSet,
        email: Set(email),
        password_hash: Set(password_hash),
        name: Set(name.trim().to_owned()),
        role: Set(ROLE_CUSTOMER.into()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(user_id = user.id, "user registered");
    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", User::from(user), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.trim().to_lowercase()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) if u.is_active => u,
        _ => return Err(AppError::Unauthorized),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = issue_token(&user, &state.jwt)?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token(user: &UserModel, jwt: &JwtConfig) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(jwt.expiration_minutes))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role.clone(),
        iss: jwt.issuer.clone(),
        aud: jwt.audience.clone(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::authenticate;

    fn jwt() -> JwtConfig {
        JwtConfig {
            secret: "unit-test-secret".into(),
            issuer: "EShop".into(),
            audience: "EShopUsers".into(),
            expiration_minutes: 5,
        }
    }

    fn user(id: i32) -> UserModel {
        let now = Utc::now().fixed_offset();
        UserModel {
            id,
            email: "someone@example.com".into(),
            password_hash: String::new(),
            name: "Someone".into(),
            role: ROLE_CUSTOMER.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_authenticates_to_the_same_user() {
        let token = issue_token(&user(42), &jwt()).unwrap();
        let auth = authenticate(&token, &jwt()).unwrap();
        assert_eq!(auth.user_id, 42);
        assert_eq!(auth.role, ROLE_CUSTOMER);
    }

    #[test]
    fn token_from_another_secret_or_audience_is_rejected() {
        let token = issue_token(&user(1), &jwt()).unwrap();

        let other_secret = JwtConfig {
            secret: "different".into(),
            ..jwt()
        };
        assert!(matches!(
            authenticate(&token, &other_secret),
            Err(AppError::Unauthorized)
        ));

        let other_audience = JwtConfig {
            audience: "someone-else".into(),
            ..jwt()
        };
        assert!(matches!(
            authenticate(&token, &other_audience),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("Customer123!").unwrap();
        assert!(verify_password("Customer123!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
