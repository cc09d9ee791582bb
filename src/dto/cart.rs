use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::cart_service::{CartLine, CartSnapshot};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: i32,
    #[schema(minimum = 1)]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    #[schema(minimum = 1)]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub price: i64,
    pub quantity: i32,
    pub subtotal: i64,
    pub stock: i32,
    pub is_available: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: i32,
    pub user_id: i32,
    pub items: Vec<CartItemView>,
    pub total_amount: i64,
    pub total_items: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub total_items: i64,
    pub total_amount: i64,
    pub line_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCartResult {
    pub cleared: bool,
}

impl CartLine {
    fn subtotal(&self) -> i64 {
        self.product.price * i64::from(self.item.quantity)
    }
}

impl CartSnapshot {
    pub fn total_items(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.item.quantity)).sum()
    }

    pub fn total_amount(&self) -> i64 {
        self.lines.iter().map(CartLine::subtotal).sum()
    }
}

impl From<&CartLine> for CartItemView {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.item.id,
            product_id: line.item.product_id,
            product_name: line.product.name.clone(),
            price: line.product.price,
            quantity: line.item.quantity,
            subtotal: line.subtotal(),
            stock: line.product.stock,
            is_available: line.product.stock > 0,
        }
    }
}

impl From<CartSnapshot> for CartView {
    fn from(snapshot: CartSnapshot) -> Self {
        Self {
            id: snapshot.cart.id,
            user_id: snapshot.cart.user_id,
            items: snapshot.lines.iter().map(CartItemView::from).collect(),
            total_amount: snapshot.total_amount(),
            total_items: snapshot.total_items(),
            updated_at: snapshot.cart.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<&CartSnapshot> for CartSummary {
    fn from(snapshot: &CartSnapshot) -> Self {
        Self {
            total_items: snapshot.total_items(),
            total_amount: snapshot.total_amount(),
            line_count: snapshot.lines.len(),
        }
    }
}
