mod common;

use eshop_api::{
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    entity::{CartItems, Carts, products::ActiveModel as ProductActive},
    error::AppError,
    services::cart_service,
};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};

use common::{create_customer, create_product, setup_file_state, setup_state};

fn add(product_id: i32, quantity: i32) -> AddToCartRequest {
    AddToCartRequest {
        product_id,
        quantity,
    }
}

#[tokio::test]
async fn get_cart_creates_once_and_is_idempotent() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "new@example.com").await?;

    let first = cart_service::get_cart(&state, &user).await?;
    let second = cart_service::get_cart(&state, &user).await?;

    assert_eq!(first.id, second.id);
    assert_eq!(first.user_id, user.user_id);
    assert!(second.items.is_empty());
    assert_eq!(second.total_items, 0);
    assert_eq!(second.total_amount, 0);
    assert_eq!(Carts::find().count(&state.orm).await?, 1);
    Ok(())
}

#[tokio::test]
async fn merge_scenario_stops_at_stock() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "scenario@example.com").await?;
    let product = create_product(&state, "Widget", 1_000, 5).await?;

    let cart = cart_service::add_to_cart(&state, &user, add(product.id, 3)).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);

    let cart = cart_service::add_to_cart(&state, &user, add(product.id, 2)).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.items[0].subtotal, 5_000);
    assert_eq!(cart.total_amount, 5_000);
    assert_eq!(cart.total_items, 5);

    let err = cart_service::add_to_cart(&state, &user, add(product.id, 1))
        .await
        .expect_err("merge past stock must fail");
    match err {
        AppError::InvalidOperation(msg) => assert!(msg.contains('5'), "message: {msg}"),
        other => panic!("unexpected error: {other:?}"),
    }

    let cart = cart_service::get_cart(&state, &user).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    Ok(())
}

#[tokio::test]
async fn stock_guard_never_writes_an_item() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "guard@example.com").await?;
    let product = create_product(&state, "Scarce", 500, 2).await?;

    let err = cart_service::add_to_cart(&state, &user, add(product.id, 3))
        .await
        .expect_err("quantity above stock must fail");
    assert!(matches!(err, AppError::InvalidOperation(_)));
    assert_eq!(CartItems::find().count(&state.orm).await?, 0);

    let sold_out = create_product(&state, "Sold Out", 500, 0).await?;
    let err = cart_service::add_to_cart(&state, &user, add(sold_out.id, 1))
        .await
        .expect_err("sold out product must fail");
    assert!(matches!(err, AppError::InvalidOperation(_)));
    assert_eq!(CartItems::find().count(&state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn add_rejects_unknown_product_and_bad_quantity() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "bad@example.com").await?;
    let product = create_product(&state, "Gadget", 700, 10).await?;

    let err = cart_service::add_to_cart(&state, &user, add(9_999, 1))
        .await
        .expect_err("unknown product");
    assert!(matches!(err, AppError::NotFound(_)));

    let err = cart_service::add_to_cart(&state, &user, add(product.id, 0))
        .await
        .expect_err("zero quantity");
    assert!(matches!(err, AppError::BadRequest(_)));

    assert_eq!(CartItems::find().count(&state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn distinct_products_get_their_own_lines() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "lines@example.com").await?;
    let mug = create_product(&state, "Mug", 120, 10).await?;
    let hoodie = create_product(&state, "Hoodie", 550, 10).await?;

    cart_service::add_to_cart(&state, &user, add(mug.id, 2)).await?;
    let cart = cart_service::add_to_cart(&state, &user, add(hoodie.id, 1)).await?;

    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.items[0].product_id, mug.id);
    assert_eq!(cart.items[1].product_name, "Hoodie");
    assert_eq!(cart.total_items, 3);
    assert_eq!(cart.total_amount, 2 * 120 + 550);

    let summary = cart_service::get_cart_summary(&state, &user).await?;
    assert_eq!(summary.total_items, 3);
    assert_eq!(summary.total_amount, 790);
    assert_eq!(summary.line_count, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_never_exceed_stock() -> anyhow::Result<()> {
    let (state, _dir) = setup_file_state(10).await?;
    let user = create_customer(&state, "race@example.com").await?;
    let product_id = create_product(&state, "Contested", 100, 5).await?.id;

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let state = state.clone();
            let user = user.clone();
            tokio::spawn(async move {
                cart_service::add_to_cart(&state, &user, add(product_id, 2)).await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InvalidOperation(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(succeeded, 2);
    assert_eq!(rejected, 1);

    let cart = cart_service::get_cart(&state, &user).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(Carts::find().count(&state.orm).await?, 1);
    assert_eq!(CartItems::find().count(&state.orm).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_yields_one_cart() -> anyhow::Result<()> {
    let (state, _dir) = setup_file_state(10).await?;
    let user = create_customer(&state, "first@example.com").await?;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let state = state.clone();
            let user = user.clone();
            tokio::spawn(async move { cart_service::get_cart(&state, &user).await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await??.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(Carts::find().count(&state.orm).await?, 1);
    Ok(())
}

#[tokio::test]
async fn update_applies_quantity_and_revalidates_stock() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "update@example.com").await?;
    let product = create_product(&state, "Lamp", 2_000, 4).await?;

    let cart = cart_service::add_to_cart(&state, &user, add(product.id, 1)).await?;
    let item_id = cart.items[0].id;

    let cart = cart_service::update_cart_item(
        &state,
        &user,
        item_id,
        UpdateCartItemRequest { quantity: 4 },
    )
    .await?;
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(cart.total_amount, 8_000);

    let err = cart_service::update_cart_item(
        &state,
        &user,
        item_id,
        UpdateCartItemRequest { quantity: 5 },
    )
    .await
    .expect_err("above stock");
    assert!(matches!(err, AppError::InvalidOperation(_)));

    let err = cart_service::update_cart_item(
        &state,
        &user,
        item_id,
        UpdateCartItemRequest { quantity: 0 },
    )
    .await
    .expect_err("zero quantity");
    assert!(matches!(err, AppError::BadRequest(_)));

    let cart = cart_service::get_cart(&state, &user).await?;
    assert_eq!(cart.items[0].quantity, 4);
    Ok(())
}

#[tokio::test]
async fn items_of_another_user_are_invisible() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let owner = create_customer(&state, "owner@example.com").await?;
    let intruder = create_customer(&state, "intruder@example.com").await?;
    let product = create_product(&state, "Private", 300, 3).await?;

    let cart = cart_service::add_to_cart(&state, &owner, add(product.id, 1)).await?;
    let item_id = cart.items[0].id;

    let err = cart_service::update_cart_item(
        &state,
        &intruder,
        item_id,
        UpdateCartItemRequest { quantity: 2 },
    )
    .await
    .expect_err("foreign item");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!cart_service::remove_cart_item(&state, &intruder, item_id).await?);

    let cart = cart_service::get_cart(&state, &owner).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 1);
    Ok(())
}

#[tokio::test]
async fn remove_reports_absence_without_touching_the_cart() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "remove@example.com").await?;
    let product = create_product(&state, "Pen", 50, 10).await?;

    let before = cart_service::add_to_cart(&state, &user, add(product.id, 2)).await?;
    let item_id = before.items[0].id;

    assert!(!cart_service::remove_cart_item(&state, &user, item_id + 1_000).await?);
    let unchanged = cart_service::get_cart(&state, &user).await?;
    assert_eq!(unchanged.items.len(), 1);
    assert_eq!(unchanged.updated_at, before.updated_at);

    assert!(cart_service::remove_cart_item(&state, &user, item_id).await?);
    let after = cart_service::get_cart(&state, &user).await?;
    assert!(after.items.is_empty());
    assert!(after.updated_at >= before.updated_at);

    assert!(!cart_service::remove_cart_item(&state, &user, item_id).await?);
    Ok(())
}

#[tokio::test]
async fn remove_for_a_new_user_does_not_create_a_cart() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "fresh@example.com").await?;

    assert!(!cart_service::remove_cart_item(&state, &user, 1).await?);
    assert_eq!(Carts::find().count(&state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn clear_is_idempotent_and_never_creates_a_cart() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "clear@example.com").await?;
    let product = create_product(&state, "Notebook", 80, 10).await?;

    assert!(!cart_service::clear_cart(&state, &user).await?);
    assert_eq!(Carts::find().count(&state.orm).await?, 0);

    let empty = cart_service::get_cart(&state, &user).await?;
    assert!(!cart_service::clear_cart(&state, &user).await?);
    let still_empty = cart_service::get_cart(&state, &user).await?;
    assert_eq!(still_empty.updated_at, empty.updated_at);

    cart_service::add_to_cart(&state, &user, add(product.id, 3)).await?;
    assert!(cart_service::clear_cart(&state, &user).await?);
    assert!(!cart_service::clear_cart(&state, &user).await?);

    let cart = cart_service::get_cart(&state, &user).await?;
    assert_eq!(cart.id, empty.id);
    assert!(cart.items.is_empty());
    assert_eq!(CartItems::find().count(&state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn updated_at_never_moves_backwards() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "clock@example.com").await?;
    let product = create_product(&state, "Clock", 1_500, 10).await?;

    let created = cart_service::get_cart(&state, &user).await?;
    let added = cart_service::add_to_cart(&state, &user, add(product.id, 1)).await?;
    assert!(added.updated_at >= created.updated_at);

    let merged = cart_service::add_to_cart(&state, &user, add(product.id, 1)).await?;
    assert!(merged.updated_at >= added.updated_at);

    let updated = cart_service::update_cart_item(
        &state,
        &user,
        merged.items[0].id,
        UpdateCartItemRequest { quantity: 3 },
    )
    .await?;
    assert!(updated.updated_at >= merged.updated_at);

    cart_service::clear_cart(&state, &user).await?;
    let cleared = cart_service::get_cart(&state, &user).await?;
    assert!(cleared.updated_at >= updated.updated_at);
    Ok(())
}

#[tokio::test]
async fn projection_reflects_current_catalog_state() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let user = create_customer(&state, "view@example.com").await?;
    let product = create_product(&state, "Seasonal", 400, 2).await?;

    cart_service::add_to_cart(&state, &user, add(product.id, 2)).await?;

    let mut active: ProductActive = product.into();
    active.stock = Set(0);
    active.update(&state.orm).await?;

    let cart = cart_service::get_cart(&state, &user).await?;
    let line = &cart.items[0];
    assert_eq!(line.quantity, 2);
    assert_eq!(line.stock, 0);
    assert!(!line.is_available);
    Ok(())
}
