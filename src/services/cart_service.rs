//! Cart aggregate: one lazily created cart per user, stock-guarded item
//! mutations, and the projections served by `/api/cart`.
//!
//! Records reference each other by id only. A [`CartSnapshot`] is assembled
//! by explicit queries and projected into the response views in
//! `dto::cart`. Every mutation runs inside a single transaction that is
//! committed on success and rolled back when dropped on any early return.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartSummary, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    state::AppState,
};

/// A cart item joined with the product it references.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub item: CartItemModel,
    pub product: ProductModel,
}

/// A cart together with its lines, ordered by item id.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub cart: CartModel,
    pub lines: Vec<CartLine>,
}

/// Returns the user's cart, creating an empty one on first access.
pub async fn get_or_create_cart(state: &AppState, user: &AuthUser) -> AppResult<CartSnapshot> {
    let cart = ensure_cart(&state.orm, user.user_id).await?;
    load_snapshot(&state.orm, cart).await
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<CartView> {
    Ok(get_or_create_cart(state, user).await?.into())
}

pub async fn get_cart_summary(state: &AppState, user: &AuthUser) -> AppResult<CartSummary> {
    let snapshot = get_or_create_cart(state, user).await?;
    Ok(CartSummary::from(&snapshot))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<CartView> {
    let AddToCartRequest {
        product_id,
        quantity,
    } = payload;
    ensure_positive(quantity)?;

    let txn = state.orm.begin().await?;
    lock_cart(&txn, user.user_id).await?;

    // The one authoritative stock read for both checks below.
    let product = Products::find_by_id(product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id} not found")))?;

    if quantity > product.stock {
        return Err(insufficient_stock(&product, quantity));
    }

    let cart = ensure_cart(&txn, user.user_id).await?;

    let new_quantity = match find_item_by_product(&txn, cart.id, product_id).await? {
        Some(item) => merge_quantity(&txn, &item, quantity, &product).await?,
        None => {
            let inserted = CartItems::insert(CartItemActive {
                id: NotSet,
                cart_id: Set(cart.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                added_at: Set(Utc::now().into()),
            })
            .on_conflict(
                OnConflict::columns([CartItemCol::CartId, CartItemCol::ProductId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

            if inserted == 0 {
                // A concurrent add created the line first; merge into it.
                let item = find_item_by_product(&txn, cart.id, product_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "cart item for product {product_id} missing after conflicting insert"
                        ))
                    })?;
                merge_quantity(&txn, &item, quantity, &product).await?
            } else {
                quantity
            }
        }
    };

    let cart = touch_cart(&txn, cart).await?;
    txn.commit().await?;

    tracing::info!(
        user_id = user.user_id,
        cart_id = cart.id,
        product_id,
        quantity = new_quantity,
        "cart item added"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({ "product_id": product_id, "quantity": quantity, "line_quantity": new_quantity }),
    )
    .await;

    Ok(load_snapshot(&state.orm, cart).await?.into())
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    cart_item_id: i32,
    payload: UpdateCartItemRequest,
) -> AppResult<CartView> {
    let quantity = payload.quantity;
    ensure_positive(quantity)?;

    let txn = state.orm.begin().await?;
    lock_cart(&txn, user.user_id).await?;
    let cart = ensure_cart(&txn, user.user_id).await?;

    let item = CartItems::find()
        .filter(CartItemCol::Id.eq(cart_item_id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cart item {cart_item_id} not found")))?;

    let product = Products::find_by_id(item.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("product {} no longer exists", item.product_id))
        })?;

    if quantity > product.stock {
        return Err(insufficient_stock(&product, quantity));
    }

    let mut active: CartItemActive = item.into();
    active.quantity = Set(quantity);
    active.update(&txn).await?;

    let cart = touch_cart(&txn, cart).await?;
    txn.commit().await?;

    tracing::info!(
        user_id = user.user_id,
        cart_item_id,
        quantity,
        "cart item updated"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "cart_item_id": cart_item_id, "quantity": quantity }),
    )
    .await;

    Ok(load_snapshot(&state.orm, cart).await?.into())
}

/// `Ok(false)` when the item is not in the user's cart. Never creates a cart.
pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    cart_item_id: i32,
) -> AppResult<bool> {
    let txn = state.orm.begin().await?;
    lock_cart(&txn, user.user_id).await?;
    let Some(cart) = find_cart(&txn, user.user_id).await? else {
        txn.rollback().await?;
        return Ok(false);
    };

    let result = CartItems::delete_many()
        .filter(CartItemCol::Id.eq(cart_item_id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    tracing::info!(user_id = user.user_id, cart_item_id, "cart item removed");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": cart_item_id }),
    )
    .await;

    Ok(true)
}

/// `Ok(false)` when there is no cart or it is already empty. Never creates a cart.
pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<bool> {
    let txn = state.orm.begin().await?;
    lock_cart(&txn, user.user_id).await?;
    let Some(cart) = find_cart(&txn, user.user_id).await? else {
        txn.rollback().await?;
        return Ok(false);
    };

    let result = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    let cart = touch_cart(&txn, cart).await?;
    txn.commit().await?;

    tracing::info!(
        user_id = user.user_id,
        cart_id = cart.id,
        removed = result.rows_affected,
        "cart cleared"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_clear",
        "carts",
        serde_json::json!({ "cart_id": cart.id, "removed": result.rows_affected }),
    )
    .await;

    Ok(true)
}

/// First statement of every cart transaction: a no-op write on the user's
/// cart row. On Postgres it row-locks the cart. On SQLite it takes the
/// database write lock before any read, so a concurrent writer waits on the
/// busy timeout instead of failing a read-to-write lock upgrade with
/// `SQLITE_BUSY`.
async fn lock_cart<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<()> {
    Carts::update_many()
        .col_expr(CartCol::UpdatedAt, Expr::col(CartCol::UpdatedAt).into())
        .filter(CartCol::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

async fn find_cart<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<Option<CartModel>> {
    Ok(Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// Explicit upsert: select, insert if absent (ignoring a concurrent winner), select again.
async fn ensure_cart<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<CartModel> {
    if let Some(cart) = find_cart(db, user_id).await? {
        return Ok(cart);
    }

    let now: DateTimeWithTimeZone = Utc::now().into();
    let inserted = Carts::insert(CartActive {
        id: NotSet,
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .on_conflict(OnConflict::column(CartCol::UserId).do_nothing().to_owned())
    .exec_without_returning(db)
    .await?;

    let cart = find_cart(db, user_id).await?.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("cart for user {user_id} missing after upsert"))
    })?;
    if inserted > 0 {
        tracing::info!(user_id, cart_id = cart.id, "cart created");
    }
    Ok(cart)
}

async fn load_snapshot<C: ConnectionTrait>(db: &C, cart: CartModel) -> AppResult<CartSnapshot> {
    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .order_by_asc(CartItemCol::Id)
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| CartLine { item, product }))
        .collect();
    Ok(CartSnapshot { cart, lines })
}

async fn find_item_by_product<C: ConnectionTrait>(
    db: &C,
    cart_id: i32,
    product_id: i32,
) -> AppResult<Option<CartItemModel>> {
    Ok(CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .one(db)
        .await?)
}

/// Adds `quantity` to an existing line in one conditional update; nothing is
/// written when the merged quantity would exceed `product.stock`.
async fn merge_quantity<C: ConnectionTrait>(
    db: &C,
    item: &CartItemModel,
    quantity: i32,
    product: &ProductModel,
) -> AppResult<i32> {
    let result = CartItems::update_many()
        .col_expr(
            CartItemCol::Quantity,
            Expr::col(CartItemCol::Quantity).add(quantity),
        )
        .filter(CartItemCol::Id.eq(item.id))
        .filter(CartItemCol::Quantity.lte(product.stock - quantity))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::InvalidOperation(format!(
            "cannot add {quantity} more: the cart already holds {} of \"{}\" and the current stock is {}",
            item.quantity, product.name, product.stock
        )));
    }
    Ok(item.quantity + quantity)
}

async fn touch_cart<C: ConnectionTrait>(db: &C, cart: CartModel) -> AppResult<CartModel> {
    let stamp = next_timestamp(cart.updated_at);
    let mut active: CartActive = cart.into();
    active.updated_at = Set(stamp);
    Ok(active.update(db).await?)
}

/// Wall-clock now, but never earlier than the previous stamp.
fn next_timestamp(previous: DateTimeWithTimeZone) -> DateTimeWithTimeZone {
    let now: DateTimeWithTimeZone = Utc::now().into();
    now.max(previous)
}

fn ensure_positive(quantity: i32) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn insufficient_stock(product: &ProductModel, requested: i32) -> AppError {
    AppError::InvalidOperation(format!(
        "insufficient stock for \"{}\": requested {requested}, current stock {}",
        product.name, product.stock
    ))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn next_timestamp_never_goes_backwards() {
        let future: DateTimeWithTimeZone = (Utc::now() + Duration::hours(1)).into();
        assert_eq!(next_timestamp(future), future);

        let past: DateTimeWithTimeZone = (Utc::now() - Duration::hours(1)).into();
        assert!(next_timestamp(past) > past);
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(ensure_positive(1).is_ok());
        assert!(matches!(ensure_positive(0), Err(AppError::BadRequest(_))));
        assert!(matches!(ensure_positive(-3), Err(AppError::BadRequest(_))));
    }
}
