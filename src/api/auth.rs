//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{SignIn, SignUp, User},
    AppState,
};

use super::{AuthenticatedUser, ValidatedJson};

/// Signin response
#[derive(Serialize, ToSchema)]
pub struct SignInResponse {
    pub user: User,
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub token_type: String,
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignUp,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "The username already exists")
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SignUp>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.auth.sign_up(&request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange credentials for a token
#[utoipa::path(
    post,
    path = "/auth/signin",
    tag = "auth",
    request_body = SignIn,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SignIn>,
) -> AppResult<Json<SignInResponse>> {
    let (token, user) = state.services.auth.sign_in(&request).await?;
    Ok(Json(SignInResponse {
        user,
        token,
        token_type: "Bearer".to_string(),
    }))
}

/// Current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.auth.get_user(claims.user_id).await?;
    Ok(Json(user))
}
