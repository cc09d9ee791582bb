use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use eshop_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{categories, products, users},
    models::{ROLE_ADMIN, ROLE_CUSTOMER},
    services::auth_service::hash_password,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url, config.max_connections).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@eshop.local", "Admin123!", "Admin", ROLE_ADMIN).await?;
    let alice_id =
        ensure_user(&orm, "alice@eshop.local", "Alice123!", "Alice", ROLE_CUSTOMER).await?;
    let bob_id = ensure_user(&orm, "bob@eshop.local", "Bob12345!", "Bob", ROLE_CUSTOMER).await?;
    seed_catalog(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, customer IDs: {alice_id}, {bob_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<i32> {
    if let Some(existing) = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already present");
        return Ok(existing.id);
    }

    let now = Utc::now();
    let user = users::ActiveModel {
        id: NotSet,
        email: Set(email.to_owned()),
        password_hash: Set(hash_password(password)?),
        name: Set(name.to_owned()),
        role: Set(role.to_owned()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(orm)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user.id)
}

async fn ensure_category(
    orm: &DatabaseConnection,
    name: &str,
    description: &str,
) -> anyhow::Result<i32> {
    if let Some(existing) = categories::Entity::find()
        .filter(categories::Column::Name.eq(name))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let category = categories::ActiveModel {
        id: NotSet,
        name: Set(name.to_owned()),
        description: Set(description.to_owned()),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(category.id)
}

async fn seed_catalog(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let apparel = ensure_category(orm, "Apparel", "Clothing and accessories").await?;
    let kitchen = ensure_category(orm, "Kitchen", "Mugs, bottles and tableware").await?;
    let books = ensure_category(orm, "Books", "Printed and digital books").await?;

    let catalog = [
        ("Canvas Hoodie", "Warm hoodie with a front pocket", 550_000, 50, apparel),
        ("Logo T-Shirt", "Cotton tee, unisex fit", 180_000, 120, apparel),
        ("Ceramic Mug", "350 ml, dishwasher safe", 120_000, 100, kitchen),
        ("Steel Bottle", "Insulated, keeps drinks cold for 24h", 210_000, 5, kitchen),
        ("Async Patterns", "A practical guide to async services", 250_000, 75, books),
        ("Limited Print", "Signed first edition", 900_000, 0, books),
    ];

    for (name, description, price, stock, category_id) in catalog {
        let exists = products::Entity::find()
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let now = Utc::now();
        products::ActiveModel {
            id: NotSet,
            name: Set(name.to_owned()),
            description: Set(description.to_owned()),
            price: Set(price),
            stock: Set(stock),
            category_id: Set(Some(category_id)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
