//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, NewLoan},
};

use super::PgTx;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    /// Get every loan of a user, returned ones included
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    /// Insert open loans one row at a time so ids follow request order
    pub async fn insert_many(
        &self,
        tx: &mut PgTx,
        user_id: i32,
        records: &[NewLoan],
    ) -> AppResult<Vec<Loan>> {
        let mut loans = Vec::with_capacity(records.len());

        for record in records {
            let loan = sqlx::query_as::<_, Loan>(
                r#"
                INSERT INTO loans (book_id, user_id, due_date, is_returned)
                VALUES ($1, $2, $3, FALSE)
                RETURNING *
                "#,
            )
            .bind(record.book_id)
            .bind(user_id)
            .bind(record.due_date)
            .fetch_one(&mut **tx)
            .await?;

            tracing::debug!(loan_id = loan.id, book_id = loan.book_id, "Inserted loan");
            loans.push(loan);
        }

        Ok(loans)
    }

    /// Close the open loans among `ids`. Rows are locked in id order so
    /// overlapping batches queue up instead of deadlocking.
    pub async fn mark_returned(
        &self,
        tx: &mut PgTx,
        ids: &[i32],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Loan>> {
        let mut loans = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET is_returned = TRUE, return_date = $2
            WHERE id IN (
                SELECT id FROM loans
                WHERE id = ANY($1) AND NOT is_returned
                ORDER BY id
                FOR UPDATE
            )
            RETURNING *
            "#,
        )
        .bind(ids)
        .bind(at)
        .fetch_all(&mut **tx)
        .await?;

        loans.sort_by_key(|loan| loan.id);
        Ok(loans)
    }

    /// Read a loan and lock it until the transaction ends
    pub async fn get_for_update(&self, tx: &mut PgTx, id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(loan)
    }

    /// Write the mutable fields of a loan
    pub async fn update(&self, tx: &mut PgTx, loan: &Loan) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET due_date = $2, return_date = $3, is_returned = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.is_returned)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan.id)))
    }
}
