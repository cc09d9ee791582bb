use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::User;

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "customer1@example.com")]
    pub email: String,
    #[schema(example = "Customer123!")]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "customer1@example.com")]
    pub email: String,
    #[schema(example = "Customer123!")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// JWT payload. `sub` holds the numeric user id.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
}
