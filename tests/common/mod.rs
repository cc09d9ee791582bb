#![allow(dead_code)]

use chrono::Utc;
use eshop_api::{
    config::JwtConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Model as ProductModel},
        users::{ActiveModel as UserActive, Model as UserModel},
    },
    middleware::auth::AuthUser,
    models::ROLE_CUSTOMER,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "integration-test-secret".into(),
        issuer: "EShop".into(),
        audience: "EShopUsers".into(),
        expiration_minutes: 5,
    }
}

/// Fresh in-memory database with every migration applied. A single
/// connection keeps the whole test on the same SQLite memory database.
pub async fn setup_state() -> anyhow::Result<AppState> {
    let orm = create_orm_conn("sqlite::memory:", 1).await?;
    run_migrations(&orm).await?;
    Ok(AppState::new(orm, jwt_config()))
}

/// File-backed database behind a multi-connection pool, so transactions
/// really overlap. Keep the returned directory alive for the whole test.
pub async fn setup_file_state(
    max_connections: u32,
) -> anyhow::Result<(AppState, tempfile::TempDir)> {
    let dir = tempfile::TempDir::new()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("eshop-test.db").display()
    );
    let orm = create_orm_conn(&url, max_connections).await?;
    run_migrations(&orm).await?;
    Ok((AppState::new(orm, jwt_config()), dir))
}

pub async fn create_user(state: &AppState, email: &str, role: &str) -> anyhow::Result<UserModel> {
    let now = Utc::now();
    let user = UserActive {
        id: NotSet,
        email: Set(email.to_owned()),
        password_hash: Set("not-a-real-hash".into()),
        name: Set(email.split('@').next().unwrap_or(email).to_owned()),
        role: Set(role.to_owned()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(user)
}

pub async fn create_customer(state: &AppState, email: &str) -> anyhow::Result<AuthUser> {
    let user = create_user(state, email, ROLE_CUSTOMER).await?;
    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

pub async fn create_product(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<ProductModel> {
    let now = Utc::now();
    let product = ProductActive {
        id: NotSet,
        name: Set(name.to_owned()),
        description: Set(format!("{name} for testing")),
        price: Set(price),
        stock: Set(stock),
        category_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}
