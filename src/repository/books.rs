//! Books repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
};

use super::PgTx;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List all books
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Create a new book, available by default
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, published_date, is_available)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.published_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Update the bibliographic fields that are present in the patch
    pub async fn update(&self, id: i32, patch: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                published_date = COALESCE($5, published_date)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(&patch.isbn)
        .bind(patch.published_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book that no loan references
    pub async fn delete(&self, id: i32) -> AppResult<Book> {
        let result = sqlx::query_as::<_, Book>("DELETE FROM books WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(book)) => Ok(book),
            Ok(None) => Err(AppError::NotFound(format!("Book with id {} not found", id))),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Err(
                AppError::Conflict(format!("Book with id {} is referenced by loans", id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Available books among `ids`, row-locked for the rest of the transaction
    pub async fn lock_available(&self, tx: &mut PgTx, ids: &[i32]) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE id = ANY($1) AND is_available
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok(books)
    }

    /// Flip availability; rows already in the target state are not counted.
    /// Locks are taken in id order, like `lock_available`.
    pub async fn set_availability(
        &self,
        tx: &mut PgTx,
        ids: &[i32],
        available: bool,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET is_available = $2
            WHERE id IN (
                SELECT id FROM books
                WHERE id = ANY($1) AND is_available <> $2
                ORDER BY id
                FOR UPDATE
            )
            "#,
        )
        .bind(ids)
        .bind(available)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
