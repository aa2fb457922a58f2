//! In-memory loan store.
//!
//! Implements [`LoanStore`] over plain maps. A transaction takes the store
//! lock for its whole lifetime and works on a staged copy of the tables;
//! `commit` swaps the copy in, dropping the handle discards it. Transactions
//! are therefore fully serialized, and the non-transactional reads must not
//! be awaited while the same task holds an open `MemoryTx`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook},
        loan::{Loan, NewLoan},
    },
};

use super::LoanStore;

#[derive(Debug, Clone, Default)]
struct Tables {
    books: BTreeMap<i32, Book>,
    loans: BTreeMap<i32, Loan>,
    last_book_id: i32,
    last_loan_id: i32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

/// Open transaction on a [`MemoryStore`]
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an available book to the catalog
    pub async fn add_book(&self, book: &CreateBook) -> Book {
        let mut tables = self.tables.lock().await;
        tables.last_book_id += 1;
        let created = Book {
            id: tables.last_book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            published_date: book.published_date,
            is_available: true,
        };
        tables.books.insert(created.id, created.clone());
        created
    }

    pub async fn book(&self, id: i32) -> Option<Book> {
        self.tables.lock().await.books.get(&id).cloned()
    }

    /// Every loan, in id order
    pub async fn loans(&self) -> Vec<Loan> {
        self.tables.lock().await.loans.values().cloned().collect()
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = (*guard).clone();
        Ok(MemoryTx { guard, staged })
    }

    async fn commit(&self, mut tx: MemoryTx) -> AppResult<()> {
        *tx.guard = tx.staged;
        Ok(())
    }

    async fn find_available_books(&self, tx: &mut MemoryTx, ids: &[i32]) -> AppResult<Vec<Book>> {
        Ok(tx
            .staged
            .books
            .values()
            .filter(|book| book.is_available && ids.contains(&book.id))
            .cloned()
            .collect())
    }

    async fn insert_loans(
        &self,
        tx: &mut MemoryTx,
        user_id: i32,
        records: &[NewLoan],
    ) -> AppResult<Vec<Loan>> {
        let tables = &mut tx.staged;
        let mut loans = Vec::with_capacity(records.len());

        for record in records {
            if !tables.books.contains_key(&record.book_id) {
                return Err(AppError::NotFound(format!(
                    "Book with id {} not found",
                    record.book_id
                )));
            }
            tables.last_loan_id += 1;
            let loan = Loan {
                id: tables.last_loan_id,
                book_id: record.book_id,
                user_id,
                due_date: record.due_date,
                return_date: None,
                is_returned: false,
            };
            tables.loans.insert(loan.id, loan.clone());
            loans.push(loan);
        }

        Ok(loans)
    }

    async fn mark_books_availability(
        &self,
        tx: &mut MemoryTx,
        ids: &[i32],
        available: bool,
    ) -> AppResult<u64> {
        let mut changed = 0;
        for book in tx.staged.books.values_mut() {
            if ids.contains(&book.id) && book.is_available != available {
                book.is_available = available;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_loans_returned(
        &self,
        tx: &mut MemoryTx,
        ids: &[i32],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Loan>> {
        let mut returned = Vec::new();
        for loan in tx.staged.loans.values_mut() {
            if ids.contains(&loan.id) && !loan.is_returned {
                loan.is_returned = true;
                loan.return_date = Some(at);
                returned.push(loan.clone());
            }
        }
        Ok(returned)
    }

    async fn find_loan_for_update(&self, tx: &mut MemoryTx, id: i32) -> AppResult<Option<Loan>> {
        Ok(tx.staged.loans.get(&id).cloned())
    }

    async fn update_loan(&self, tx: &mut MemoryTx, loan: &Loan) -> AppResult<Loan> {
        let stored = tx
            .staged
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan.id)))?;
        stored.due_date = loan.due_date;
        stored.return_date = loan.return_date;
        stored.is_returned = loan.is_returned;
        Ok(stored.clone())
    }

    async fn find_loan(&self, id: i32) -> AppResult<Option<Loan>> {
        Ok(self.tables.lock().await.loans.get(&id).cloned())
    }

    async fn find_user_loans(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        Ok(self
            .tables
            .lock()
            .await
            .loans
            .values()
            .filter(|loan| loan.user_id == user_id)
            .cloned()
            .collect())
    }
}
