//! Table bootstrap from the entity definitions
//!
//! Creates any missing table with its composite primary key. This is not a
//! migration system: existing tables are left untouched.

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, EntityTrait, Schema};
use tracing::info;

async fn create_table<E, C>(conn: &C, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Create every YouBook table that does not exist yet
pub async fn create_tables<C: ConnectionTrait>(conn: &C) -> Result<()> {
    let schema = Schema::new(conn.get_database_backend());

    create_table(conn, &schema, UserInfoEntity).await?;
    create_table(conn, &schema, RawEntryEntity).await?;
    create_table(conn, &schema, TransformedEntryEntity).await?;
    create_table(conn, &schema, ChatbotTurnEntity).await?;
    create_table(conn, &schema, ChatbotSummaryEntity).await?;
    create_table(conn, &schema, FinalizedSectionEntity).await?;
    create_table(conn, &schema, BookListingEntity).await?;
    create_table(conn, &schema, BookSectionEntity).await?;

    info!("Schema bootstrap complete");
    Ok(())
}
