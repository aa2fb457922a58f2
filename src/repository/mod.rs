//! Repository layer for database operations

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::AppResult,
    models::{book::Book, loan::{Loan, NewLoan}},
};

pub use memory::MemoryStore;

/// Transaction handle used by the PostgreSQL store
pub type PgTx = Transaction<'static, Postgres>;

/// Transactional access to books and loans for the loan lifecycle.
///
/// A `Tx` obtained from [`LoanStore::begin`] groups every call made with it
/// into one unit: nothing is visible to other transactions until
/// [`LoanStore::commit`], and dropping the handle without committing rolls
/// everything back.
#[async_trait]
pub trait LoanStore: Clone + Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> AppResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> AppResult<()>;

    /// Books among `ids` that are currently available. Returned rows stay
    /// locked against concurrent writers until the transaction ends.
    async fn find_available_books(&self, tx: &mut Self::Tx, ids: &[i32]) -> AppResult<Vec<Book>>;

    /// Insert one open loan per record, in order, all for `user_id`
    async fn insert_loans(
        &self,
        tx: &mut Self::Tx,
        user_id: i32,
        records: &[NewLoan],
    ) -> AppResult<Vec<Loan>>;

    /// Set availability on the given books; returns how many rows changed
    async fn mark_books_availability(
        &self,
        tx: &mut Self::Tx,
        ids: &[i32],
        available: bool,
    ) -> AppResult<u64>;

    /// Close every open loan among `ids`. Returns only the loans that were
    /// open before the call.
    async fn mark_loans_returned(
        &self,
        tx: &mut Self::Tx,
        ids: &[i32],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Loan>>;

    async fn find_loan_for_update(&self, tx: &mut Self::Tx, id: i32) -> AppResult<Option<Loan>>;

    /// Overwrite due date, return date and returned flag of `loan.id`
    async fn update_loan(&self, tx: &mut Self::Tx, loan: &Loan) -> AppResult<Loan>;

    async fn find_loan(&self, id: i32) -> AppResult<Option<Loan>>;

    async fn find_user_loans(&self, user_id: i32) -> AppResult<Vec<Loan>>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub loans: loans::LoansRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }

    /// Check that the database answers
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LoanStore for Repository {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> AppResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn find_available_books(&self, tx: &mut PgTx, ids: &[i32]) -> AppResult<Vec<Book>> {
        self.books.lock_available(tx, ids).await
    }

    async fn insert_loans(
        &self,
        tx: &mut PgTx,
        user_id: i32,
        records: &[NewLoan],
    ) -> AppResult<Vec<Loan>> {
        self.loans.insert_many(tx, user_id, records).await
    }

    async fn mark_books_availability(
        &self,
        tx: &mut PgTx,
        ids: &[i32],
        available: bool,
    ) -> AppResult<u64> {
        self.books.set_availability(tx, ids, available).await
    }

    async fn mark_loans_returned(
        &self,
        tx: &mut PgTx,
        ids: &[i32],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Loan>> {
        self.loans.mark_returned(tx, ids, at).await
    }

    async fn find_loan_for_update(&self, tx: &mut PgTx, id: i32) -> AppResult<Option<Loan>> {
        self.loans.get_for_update(tx, id).await
    }

    async fn update_loan(&self, tx: &mut PgTx, loan: &Loan) -> AppResult<Loan> {
        self.loans.update(tx, loan).await
    }

    async fn find_loan(&self, id: i32) -> AppResult<Option<Loan>> {
        self.loans.get_by_id(id).await
    }

    async fn find_user_loans(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        self.loans.get_user_loans(user_id).await
    }
}

/// These run against a real PostgreSQL server: set `DATABASE_URL` and use
/// `cargo test -- --ignored`. Each test gets a fresh migrated database.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{book::CreateBook, user::SignUp};
    use crate::services::loans::LoansService;
    use chrono::Duration;
    use sqlx::PgPool;

    async fn seed(repository: &Repository, books: usize) -> (i32, Vec<Book>) {
        let user = repository
            .users
            .create(
                &SignUp {
                    username: "reader".to_string(),
                    password: "unused".to_string(),
                    full_name: "Test Reader".to_string(),
                    email: "reader@example.org".to_string(),
                    address: None,
                    is_admin: false,
                },
                "$argon2id$placeholder",
            )
            .await
            .unwrap();

        let mut created = Vec::new();
        for n in 0..books {
            created.push(
                repository
                    .books
                    .create(&CreateBook {
                        title: format!("Kindred {}", n),
                        author: "Octavia E. Butler".to_string(),
                        isbn: format!("97808070830{:02}", n),
                        published_date: Utc::now() - Duration::days(365 * 40),
                    })
                    .await
                    .unwrap(),
            );
        }
        (user.id, created)
    }

    fn loan_for(book: &Book) -> NewLoan {
        NewLoan {
            book_id: book.id,
            due_date: Utc::now() + Duration::days(14),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_concurrent_creates_lend_a_book_once(pool: PgPool) {
        let repository = Repository::new(pool);
        let (user_id, books) = seed(&repository, 1).await;
        let service = LoansService::new(repository.clone());
        let wanted = [loan_for(&books[0])];

        let (first, second) = tokio::join!(
            service.create_loans(user_id, &wanted),
            service.create_loans(user_id, &wanted)
        );

        assert!(first.is_ok() ^ second.is_ok());
        let failed = if first.is_err() { first } else { second };
        assert!(matches!(failed, Err(AppError::Unavailable(_))));
        assert_eq!(repository.loans.get_user_loans(user_id).await.unwrap().len(), 1);
        assert!(!repository.books.get_by_id(books[0].id).await.unwrap().is_available);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_overlapping_returns_close_each_loan_once(pool: PgPool) {
        let repository = Repository::new(pool);
        let (user_id, books) = seed(&repository, 3).await;
        let service = LoansService::new(repository.clone());
        let loans = service
            .create_loans(user_id, &books.iter().map(loan_for).collect::<Vec<_>>())
            .await
            .unwrap();
        let forward: Vec<i32> = loans.iter().map(|loan| loan.id).collect();
        let backward: Vec<i32> = forward.iter().rev().copied().collect();

        let (a, b) = tokio::join!(service.return_loans(&forward), service.return_loans(&backward));

        assert_eq!(a.unwrap().count + b.unwrap().count, 3);
        for book in &books {
            assert!(repository.books.get_by_id(book.id).await.unwrap().is_available);
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_store_counts_only_changed_rows(pool: PgPool) {
        let repository = Repository::new(pool);
        let (user_id, books) = seed(&repository, 2).await;
        let ids = [books[0].id, books[1].id];

        let mut tx = repository.begin().await.unwrap();
        assert_eq!(repository.find_available_books(&mut tx, &ids).await.unwrap().len(), 2);
        assert_eq!(repository.mark_books_availability(&mut tx, &ids[..1], false).await.unwrap(), 1);
        assert_eq!(repository.mark_books_availability(&mut tx, &ids, false).await.unwrap(), 1);

        let loans = repository
            .insert_loans(&mut tx, user_id, &[loan_for(&books[1]), loan_for(&books[0])])
            .await
            .unwrap();
        assert_eq!(loans[0].book_id, books[1].id);
        assert_eq!(loans[1].book_id, books[0].id);

        let at = Utc::now();
        let ids: Vec<i32> = loans.iter().map(|loan| loan.id).collect();
        let returned = repository.mark_loans_returned(&mut tx, &ids, at).await.unwrap();
        assert_eq!(returned.len(), 2);
        assert!(returned.iter().all(|loan| loan.is_returned && loan.return_date.is_some()));
        assert!(repository.mark_loans_returned(&mut tx, &ids, at).await.unwrap().is_empty());
        repository.commit(tx).await.unwrap();

        // Dropped without commit
        {
            let mut tx = repository.begin().await.unwrap();
            repository.mark_books_availability(&mut tx, &[books[0].id], true).await.unwrap();
        }
        assert!(!repository.books.get_by_id(books[0].id).await.unwrap().is_available);
    }
}
