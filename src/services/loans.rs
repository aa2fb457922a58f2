//! Loan lifecycle service
//!
//! Every mutation runs in one store transaction. Errors returned with `?`
//! drop the open transaction, which rolls it back, so a failed call never
//! leaves loans or availability flags half-written.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, NewLoan, ReturnCount, UpdateLoan},
    repository::LoanStore,
};

#[derive(Clone)]
pub struct LoansService<S> {
    store: S,
}

impl<S: LoanStore> LoansService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow every requested book for `user_id`, or none of them.
    ///
    /// Fails with `Unavailable` when any requested book is missing, already
    /// on loan, or requested twice.
    pub async fn create_loans(&self, user_id: i32, requests: &[NewLoan]) -> AppResult<Vec<Loan>> {
        if requests.is_empty() {
            return Err(AppError::BadRequest("At least one loan is required".to_string()));
        }

        let book_ids: Vec<i32> = requests
            .iter()
            .map(|request| request.book_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut tx = self.store.begin().await?;

        let available = self.store.find_available_books(&mut tx, &book_ids).await?;
        if available.len() < requests.len() {
            let unavailable: Vec<i32> = book_ids
                .iter()
                .copied()
                .filter(|id| !available.iter().any(|book| book.id == *id))
                .collect();
            tracing::warn!(
                user_id,
                requested = requests.len(),
                available = available.len(),
                ?unavailable,
                "Loan request rejected"
            );
            return Err(AppError::Unavailable(if unavailable.is_empty() {
                "A book cannot be borrowed twice in one request".to_string()
            } else {
                format!("Please select available books (unavailable: {:?})", unavailable)
            }));
        }

        let loans = self.store.insert_loans(&mut tx, user_id, requests).await?;

        let flipped = self
            .store
            .mark_books_availability(&mut tx, &book_ids, false)
            .await?;
        if flipped != book_ids.len() as u64 {
            tracing::warn!(user_id, flipped, expected = book_ids.len(), "Availability changed concurrently");
            return Err(AppError::Unavailable(
                "Please select available books".to_string(),
            ));
        }

        self.store.commit(tx).await?;

        tracing::info!(user_id, count = loans.len(), "Loans created");
        Ok(loans)
    }

    /// Close the open loans among `loan_ids` and release their books.
    ///
    /// Ids that do not exist or are already returned are skipped; the count
    /// only covers loans that were actually closed.
    pub async fn return_loans(&self, loan_ids: &[i32]) -> AppResult<ReturnCount> {
        if loan_ids.is_empty() {
            return Err(AppError::BadRequest("At least one loan id is required".to_string()));
        }

        let ids: Vec<i32> = loan_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

        let mut tx = self.store.begin().await?;

        let returned = self
            .store
            .mark_loans_returned(&mut tx, &ids, Utc::now())
            .await?;

        // Only books of loans closed here: an already-returned loan may point
        // at a book that is out again on a newer loan.
        let book_ids: Vec<i32> = returned
            .iter()
            .map(|loan| loan.book_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !book_ids.is_empty() {
            self.store
                .mark_books_availability(&mut tx, &book_ids, true)
                .await?;
        }

        self.store.commit(tx).await?;

        tracing::info!(requested = ids.len(), returned = returned.len(), "Loans returned");
        Ok(ReturnCount {
            count: returned.len() as u64,
        })
    }

    /// Patch due date, return date or returned flag of one loan.
    ///
    /// Book availability is left as is.
    pub async fn update_loan(&self, id: i32, patch: &UpdateLoan) -> AppResult<Loan> {
        let mut tx = self.store.begin().await?;

        let current = self
            .store
            .find_loan_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        if patch.is_empty() {
            return Ok(current);
        }

        let merged = patch.apply(&current)?;
        let updated = self.store.update_loan(&mut tx, &merged).await?;

        self.store.commit(tx).await?;

        tracing::debug!(loan_id = id, "Loan updated");
        Ok(updated)
    }

    /// Get loan by ID
    pub async fn find_one(&self, id: i32) -> AppResult<Loan> {
        self.store
            .find_loan(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get every loan of a user (possibly none)
    pub async fn find_all_for_user(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        self.store.find_user_loans(user_id).await
    }
}
