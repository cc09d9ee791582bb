use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};

use crate::{
    dto::cart::{AddToCartRequest, CartSummary, CartView, ClearCartResult, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::{JsonBody, PathParam},
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/summary", get(get_cart_summary))
        .route("/items", post(add_to_cart))
        .route(
            "/items/{cart_item_id}",
            put(update_cart_item).delete(remove_cart_item),
        )
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current user's cart, created empty on first access", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let cart = cart_service::get_cart(&state, &user).await?;
    Ok(Json(ApiResponse::ok(cart)))
}

#[utoipa::path(
    get,
    path = "/api/cart/summary",
    responses(
        (status = 200, description = "Item count and total amount", body = ApiResponse<CartSummary>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartSummary>>> {
    let summary = cart_service::get_cart_summary(&state, &user).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added or merged into an existing line", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid body or insufficient stock"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Product not found"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let cart = cart_service::add_to_cart(&state, &user, payload).await?;
    Ok(Json(ApiResponse::success("Added to cart", cart, None)))
}

#[utoipa::path(
    put,
    path = "/api/cart/items/{cart_item_id}",
    params(
        ("cart_item_id" = i32, Path, description = "Cart item ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid body or insufficient stock"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Cart item not found"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(cart_item_id): PathParam<i32>,
    JsonBody(payload): JsonBody<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let cart = cart_service::update_cart_item(&state, &user, cart_item_id, payload).await?;
    Ok(Json(ApiResponse::success("Cart updated", cart, None)))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{cart_item_id}",
    params(
        ("cart_item_id" = i32, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Removed from cart", body = ApiResponse<serde_json::Value>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Cart item not found"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(cart_item_id): PathParam<i32>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if !cart_service::remove_cart_item(&state, &user, cart_item_id).await? {
        return Err(AppError::NotFound(format!(
            "cart item {cart_item_id} not found"
        )));
    }
    Ok(Json(ApiResponse::message("Removed from cart")))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart emptied; `cleared` is false when it was already empty", body = ApiResponse<ClearCartResult>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ClearCartResult>>> {
    let cleared = cart_service::clear_cart(&state, &user).await?;
    let message = if cleared {
        "Cart cleared"
    } else {
        "Cart already empty"
    };
    Ok(Json(ApiResponse::success(
        message,
        ClearCartResult { cleared },
        None,
    )))
}
