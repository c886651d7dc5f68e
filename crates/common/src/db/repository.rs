//! Repository pattern for database reads
//!
//! Exact-key lookups used by the drafting flows and the library routes.
//! Writes go through the upsert writer inside a transaction instead.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// The underlying pool, for flows that open transactions
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Profile of a user; `UserNotFound` when the id is unknown
    pub async fn find_user(&self, user_id: &str) -> Result<UserInfo> {
        UserInfoEntity::find_by_id(user_id.to_string())
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                id: user_id.to_string(),
            })
    }

    // ========================================================================
    // Drafting
    // ========================================================================

    /// Every raw entry of a book joined by newlines, in sequence order.
    /// `None` when the book has no entries yet.
    pub async fn previous_content(&self, user_id: &str, book_id: &str) -> Result<Option<String>> {
        let entries = RawEntryEntity::find()
            .filter(RawEntryColumn::UserId.eq(user_id))
            .filter(RawEntryColumn::BookId.eq(book_id))
            .order_by_asc(RawEntryColumn::InputCount)
            .all(self.conn())
            .await?;

        if entries.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            entries
                .into_iter()
                .map(|entry| entry.content)
                .collect::<Vec<_>>()
                .join("\n"),
        ))
    }

    /// Interview turns recorded for one sequence of a book, by question number
    pub async fn chatbot_turns(
        &self,
        user_id: &str,
        book_id: &str,
        input_count: i32,
    ) -> Result<Vec<ChatbotTurn>> {
        ChatbotTurnEntity::find()
            .filter(ChatbotTurnColumn::UserId.eq(user_id))
            .filter(ChatbotTurnColumn::BookId.eq(book_id))
            .filter(ChatbotTurnColumn::InputCount.eq(input_count))
            .order_by_asc(ChatbotTurnColumn::QuestNum)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Finalized sections of one draft, by content order
    pub async fn finalized_sections(
        &self,
        user_id: &str,
        book_id: &str,
        input_count: i32,
    ) -> Result<Vec<FinalizedSection>> {
        FinalizedSectionEntity::find()
            .filter(FinalizedSectionColumn::UserId.eq(user_id))
            .filter(FinalizedSectionColumn::BookId.eq(book_id))
            .filter(FinalizedSectionColumn::InputCount.eq(input_count))
            .order_by_asc(FinalizedSectionColumn::ContentOrder)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Stored books of a user, most recently stored first
    pub async fn list_books(&self, user_id: &str) -> Result<Vec<BookListing>> {
        BookListingEntity::find()
            .filter(BookListingColumn::UserId.eq(user_id))
            .order_by_desc(BookListingColumn::CreateDate)
            .order_by_asc(BookListingColumn::BookId)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Stored sections of one book, by content order
    pub async fn book_sections(&self, user_id: &str, book_id: &str) -> Result<Vec<BookSection>> {
        BookSectionEntity::find()
            .filter(BookSectionColumn::UserId.eq(user_id))
            .filter(BookSectionColumn::BookId.eq(book_id))
            .order_by_asc(BookSectionColumn::ContentOrder)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}
