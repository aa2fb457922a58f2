//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoans, Loan, ReturnCount, ReturnLoans, UpdateLoan},
    AppState,
};

use super::{parse_id, AuthenticatedUser, ValidatedJson};

/// Borrow one or more books for a user
#[utoipa::path(
    post,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "ID of the borrowing user")
    ),
    request_body = CreateLoans,
    responses(
        (status = 201, description = "Loans created", body = Vec<Loan>),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "A requested book is unavailable or missing")
    )
)]
pub async fn create_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<String>,
    ValidatedJson(request): ValidatedJson<CreateLoans>,
) -> AppResult<(StatusCode, Json<Vec<Loan>>)> {
    let user_id = parse_id(&user_id)?;
    tracing::debug!(principal = claims.user_id, user_id, books = request.data.len(), "Create loans");

    let loans = state.services.loans.create_loans(user_id, &request.data).await?;
    Ok((StatusCode::CREATED, Json(loans)))
}

/// Get every loan of a user
#[utoipa::path(
    get,
    path = "/loans/user/{userId}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("userId" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<Loan>),
        (status = 400, description = "Invalid user ID"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User has no loans")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Loan>>> {
    let user_id = parse_id(&user_id)?;

    let loans = state.services.loans.find_all_for_user(user_id).await?;
    if loans.is_empty() {
        return Err(AppError::NotFound(format!("No loans for user {}", user_id)));
    }
    Ok(Json(loans))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Loan>> {
    let id = parse_id(&id)?;

    let loan = state.services.loans.find_one(id).await?;
    Ok(Json(loan))
}

/// Patch due date, return date or returned flag of a loan
#[utoipa::path(
    patch,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = UpdateLoan,
    responses(
        (status = 200, description = "Loan updated", body = Loan),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<UpdateLoan>,
) -> AppResult<Json<Loan>> {
    let id = parse_id(&id)?;

    let loan = state.services.loans.update_loan(id, &patch).await?;
    Ok(Json(loan))
}

/// Return a batch of loans
#[utoipa::path(
    patch,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = ReturnLoans,
    responses(
        (status = 200, description = "Number of loans returned", body = ReturnCount),
        (status = 400, description = "Invalid loan IDs"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No open loan matched")
    )
)]
pub async fn return_loans(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<ReturnLoans>,
) -> AppResult<Json<ReturnCount>> {
    let result = state.services.loans.return_loans(&request.id).await?;
    if result.count == 0 {
        return Err(AppError::NotFound("No open loan matched".to_string()));
    }
    Ok(Json(result))
}
