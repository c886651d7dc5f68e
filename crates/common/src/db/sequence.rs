//! Sequence resolver
//!
//! Input counts are dense and 1-based per (user, book). The next number is
//! `MAX(input_count) + 1` over `init_input`; an empty book counts as 0.
//! Concurrent writers may read the same maximum, which is why new slots are
//! written with [`upsert::append`](crate::db::upsert::append) and retried on
//! conflict.

use crate::db::models::{raw_entry, RawEntryEntity};
use crate::errors::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};

/// Sequence number of the first entry of a book
pub const FIRST_SEQUENCE: i32 = 1;

/// Resolves input counts for a (user, book) pair
pub struct SequenceResolver;

impl SequenceResolver {
    /// Highest input count in use, 0 when the book has no entries
    pub async fn current_max<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        book_id: &str,
    ) -> Result<i32> {
        let max: Option<Option<i32>> = RawEntryEntity::find()
            .select_only()
            .column_as(Expr::col(raw_entry::Column::InputCount).max(), "max_input_count")
            .filter(raw_entry::Column::UserId.eq(user_id))
            .filter(raw_entry::Column::BookId.eq(book_id))
            .into_tuple()
            .one(conn)
            .await?;

        Ok(max.flatten().unwrap_or(0))
    }

    /// Next input count to write. A book without an id yet starts at 1
    /// without touching the database.
    pub async fn next<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        book_id: Option<&str>,
    ) -> Result<i32> {
        match book_id {
            None => Ok(FIRST_SEQUENCE),
            Some(book_id) => Ok(Self::current_max(conn, user_id, book_id).await? + 1),
        }
    }
}
