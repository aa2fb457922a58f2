//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub is_returned: bool,
}

/// One requested loan: the book to borrow and when it is due back
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewLoan {
    #[validate(range(min = 1, message = "Book id must be a positive integer"))]
    pub book_id: i32,
    /// Due date (ISO 8601)
    pub due_date: DateTime<Utc>,
}

/// Create loans request body
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoans {
    #[validate(length(min = 1, message = "At least one loan is required"), nested)]
    pub data: Vec<NewLoan>,
}

/// Return loans request body
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReturnLoans {
    /// Loan IDs to return
    #[validate(
        length(min = 1, message = "At least one loan id is required"),
        custom(function = "validate_ids")
    )]
    pub id: Vec<i32>,
}

/// Result of a batch return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReturnCount {
    pub count: u64,
}

/// Partial loan update. `returnDate` may be explicitly set to null.
#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateLoan {
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, format = DateTime, nullable)]
    pub return_date: Option<Option<DateTime<Utc>>>,
    pub is_returned: Option<bool>,
}

impl UpdateLoan {
    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.return_date.is_none() && self.is_returned.is_none()
    }

    /// Merge the patch into `current`, rejecting results where a returned
    /// loan has no return date.
    pub fn apply(&self, current: &Loan) -> AppResult<Loan> {
        let merged = Loan {
            due_date: self.due_date.unwrap_or(current.due_date),
            return_date: self.return_date.unwrap_or(current.return_date),
            is_returned: self.is_returned.unwrap_or(current.is_returned),
            ..current.clone()
        };

        if merged.is_returned && merged.return_date.is_none() {
            return Err(AppError::Validation(
                "A returned loan must have a returnDate".to_string(),
            ));
        }

        Ok(merged)
    }
}

fn validate_ids(ids: &[i32]) -> Result<(), ValidationError> {
    if ids.iter().all(|id| *id > 0) {
        Ok(())
    } else {
        let mut error = ValidationError::new("positive_ids");
        error.message = Some("Loan ids must be positive integers".into());
        Err(error)
    }
}
