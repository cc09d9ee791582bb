use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{
            AddToCartRequest, CartItemView, CartSummary, CartView, ClearCartResult,
            UpdateCartItemRequest,
        },
        products::{CategoryList, CreateProductRequest, ProductList, UpdateProductRequest},
    },
    models::{Category, Product, User},
    response::{ApiResponse, Meta},
    routes::{auth, cart, categories, health, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        cart::get_cart,
        cart::get_cart_summary,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        categories::list_categories
    ),
    components(
        schemas(
            User,
            Product,
            Category,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemView,
            CartView,
            CartSummary,
            ClearCartResult,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CategoryList,
            params::ProductSortBy,
            params::SortOrder,
            health::HealthData,
            Meta,
            ApiResponse<CartView>,
            ApiResponse<CartSummary>,
            ApiResponse<Product>,
            ApiResponse<ProductList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Products", description = "Catalog endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
