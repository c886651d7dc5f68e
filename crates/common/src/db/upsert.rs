//! Upsert writer for versioned content slots
//!
//! A slot is identified by (user, book, input_count). Three write modes:
//! - append: plain insert, a taken slot surfaces as a unique violation
//! - merge: insert, or on a duplicate key overwrite only the payload columns
//! - overwrite: update by exact key, zero matched rows is `SlotNotFound`
//!
//! Every call touches exactly one row in exactly one table.

use crate::db::models::{chatbot_summary, raw_entry, transformed_entry};
use crate::errors::{AppError, Result};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    QueryFilter, Set, Value,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Composite identity of one versioned content slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotKey {
    pub user_id: String,
    pub book_id: String,
    pub input_count: i32,
}

impl SlotKey {
    pub fn new(user_id: impl Into<String>, book_id: impl Into<String>, input_count: i32) -> Self {
        Self {
            user_id: user_id.into(),
            book_id: book_id.into(),
            input_count,
        }
    }

    /// Same book, different sequence number
    pub fn at(&self, input_count: i32) -> Self {
        Self {
            input_count,
            ..self.clone()
        }
    }
}

/// Mutable columns of a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub content: String,
    pub category: Option<String>,
}

impl ContentPayload {
    pub fn new(content: impl Into<String>, category: Option<String>) -> Self {
        Self {
            content: content.into(),
            category,
        }
    }
}

/// A table of versioned content slots
pub trait VersionedContent: EntityTrait {
    /// Name used in logs and errors
    const LABEL: &'static str;

    /// Key columns in (user, book, input_count) order
    fn key_columns() -> [Self::Column; 3];

    fn content_column() -> Self::Column;

    /// `None` for tables without a category
    fn category_column() -> Option<Self::Column>;

    fn new_row(key: &SlotKey, payload: &ContentPayload) -> Self::ActiveModel;

    fn payload_columns() -> Vec<Self::Column> {
        std::iter::once(Self::content_column())
            .chain(Self::category_column())
            .collect()
    }

    fn payload_values(payload: &ContentPayload) -> Vec<(Self::Column, Value)> {
        let mut values = vec![(Self::content_column(), payload.content.clone().into())];
        if let Some(column) = Self::category_column() {
            values.push((column, payload.category.clone().into()));
        }
        values
    }

    fn key_condition(key: &SlotKey) -> Condition {
        let [user, book, count] = Self::key_columns();
        Condition::all()
            .add(user.eq(key.user_id.as_str()))
            .add(book.eq(key.book_id.as_str()))
            .add(count.eq(key.input_count))
    }
}

impl VersionedContent for raw_entry::Entity {
    const LABEL: &'static str = "init_input";

    fn key_columns() -> [Self::Column; 3] {
        [
            raw_entry::Column::UserId,
            raw_entry::Column::BookId,
            raw_entry::Column::InputCount,
        ]
    }

    fn content_column() -> Self::Column {
        raw_entry::Column::Content
    }

    fn category_column() -> Option<Self::Column> {
        Some(raw_entry::Column::Category)
    }

    fn new_row(key: &SlotKey, payload: &ContentPayload) -> Self::ActiveModel {
        raw_entry::ActiveModel {
            user_id: Set(key.user_id.clone()),
            book_id: Set(key.book_id.clone()),
            input_count: Set(key.input_count),
            content: Set(payload.content.clone()),
            category: Set(payload.category.clone()),
        }
    }
}

impl VersionedContent for transformed_entry::Entity {
    const LABEL: &'static str = "purified_input";

    fn key_columns() -> [Self::Column; 3] {
        [
            transformed_entry::Column::UserId,
            transformed_entry::Column::BookId,
            transformed_entry::Column::InputCount,
        ]
    }

    fn content_column() -> Self::Column {
        transformed_entry::Column::Content
    }

    fn category_column() -> Option<Self::Column> {
        Some(transformed_entry::Column::Category)
    }

    fn new_row(key: &SlotKey, payload: &ContentPayload) -> Self::ActiveModel {
        transformed_entry::ActiveModel {
            user_id: Set(key.user_id.clone()),
            book_id: Set(key.book_id.clone()),
            input_count: Set(key.input_count),
            content: Set(payload.content.clone()),
            category: Set(payload.category.clone()),
        }
    }
}

impl VersionedContent for chatbot_summary::Entity {
    const LABEL: &'static str = "chatbot_summary";

    fn key_columns() -> [Self::Column; 3] {
        [
            chatbot_summary::Column::UserId,
            chatbot_summary::Column::BookId,
            chatbot_summary::Column::InputCount,
        ]
    }

    fn content_column() -> Self::Column {
        chatbot_summary::Column::Content
    }

    fn category_column() -> Option<Self::Column> {
        None
    }

    fn new_row(key: &SlotKey, payload: &ContentPayload) -> Self::ActiveModel {
        chatbot_summary::ActiveModel {
            user_id: Set(key.user_id.clone()),
            book_id: Set(key.book_id.clone()),
            input_count: Set(key.input_count),
            content: Set(payload.content.clone()),
        }
    }
}

/// Insert into a fresh slot. A taken slot fails with a unique violation.
pub async fn append<E, C>(conn: &C, key: &SlotKey, payload: &ContentPayload) -> Result<()>
where
    E: VersionedContent,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
    E::Model: IntoActiveModel<E::ActiveModel>,
    C: ConnectionTrait,
{
    E::insert(E::new_row(key, payload))
        .exec_without_returning(conn)
        .await?;

    debug!(
        table = E::LABEL,
        user_id = %key.user_id,
        book_id = %key.book_id,
        input_count = key.input_count,
        "Slot appended"
    );
    Ok(())
}

/// Insert, or overwrite the payload columns of an existing slot
pub async fn merge<E, C>(conn: &C, key: &SlotKey, payload: &ContentPayload) -> Result<()>
where
    E: VersionedContent,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
    E::Model: IntoActiveModel<E::ActiveModel>,
    C: ConnectionTrait,
{
    let on_conflict = OnConflict::columns(E::key_columns())
        .update_columns(E::payload_columns())
        .to_owned();

    E::insert(E::new_row(key, payload))
        .on_conflict(on_conflict)
        .exec_without_returning(conn)
        .await?;

    debug!(
        table = E::LABEL,
        user_id = %key.user_id,
        book_id = %key.book_id,
        input_count = key.input_count,
        "Slot merged"
    );
    Ok(())
}

/// Overwrite the payload of an existing slot, by exact key
pub async fn overwrite<E, C>(conn: &C, key: &SlotKey, payload: &ContentPayload) -> Result<()>
where
    E: VersionedContent,
    C: ConnectionTrait,
{
    let mut update = E::update_many();
    for (column, value) in E::payload_values(payload) {
        update = update.col_expr(column, Expr::value(value));
    }

    let result = update.filter(E::key_condition(key)).exec(conn).await?;

    if result.rows_affected == 0 {
        return Err(AppError::SlotNotFound {
            book_id: key.book_id.clone(),
            input_count: key.input_count,
        });
    }

    debug!(
        table = E::LABEL,
        user_id = %key.user_id,
        book_id = %key.book_id,
        input_count = key.input_count,
        "Slot overwritten"
    );
    Ok(())
}
