//! Drafting flows
//!
//! Every write route is one of these compositions:
//!
//! ```text
//! resolve sequence -> transform (no transaction open) -> transaction { upserts } -> outcome
//! ```
//!
//! New sequence numbers are claimed with an append inside the same
//! transaction that read the maximum. A concurrent writer that claimed the
//! slot first surfaces as a unique violation and the whole unit is retried,
//! at most [`MAX_SEQUENCE_ATTEMPTS`] times.

use crate::db::models::*;
use crate::db::sequence::FIRST_SEQUENCE;
use crate::db::upsert::{append, merge, overwrite};
use crate::db::{run_in_transaction, ContentPayload, Repository, SequenceResolver, SlotKey};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::transformer::{ContentTransformer, UserProfile};
use crate::DEFAULT_BOOK_TITLE;
use chrono::{Local, NaiveDate};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at claiming a fresh sequence number before giving up
pub const MAX_SEQUENCE_ATTEMPTS: u32 = 3;

/// Where a book's latest entry landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedEntry {
    pub book_id: String,
    pub input_count: i32,
}

/// Which slots a stage-and-transform writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// Correct the raw entry at the current maximum instead of appending
    pub overwrite_raw: bool,
    /// Put the transformed entry at the current maximum instead of max + 1
    pub transformed_at_latest: bool,
}

/// Result of summarizing one interview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub input_count: i32,
    pub content: String,
}

/// A finished draft to copy into the library
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub book_id: String,
    pub input_count: i32,
    pub category: Option<String>,
    pub title: Option<String>,
    pub image_path: Option<String>,
}

/// Address of one finalized section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRef {
    pub book_id: String,
    pub input_count: i32,
    pub content_order: i32,
}

/// Flat interview transcript: `User: {question}, Assistant: {response}` per
/// turn, the first turn without the `User:` marker, joined by spaces
pub fn format_transcript(turns: &[ChatbotTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let speaker = if turn.quest_num == 1 { "" } else { "User: " };
            format!("{}{}, Assistant: {}", speaker, turn.question, turn.response)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a sequence-claiming unit, retrying while another writer wins the slot
async fn with_sequence_retry<T, F, Fut>(mut unit: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match unit().await {
            Err(err) if err.is_unique_violation() => {
                if attempt >= MAX_SEQUENCE_ATTEMPTS {
                    return Err(AppError::SlotConflict {
                        message: format!("still taken after {} attempts", attempt),
                    });
                }
                metrics::record_sequence_retry();
                warn!(attempt, "Sequence slot claimed concurrently, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Empty or missing ids start a new book
fn resolve_book_id(book_id: Option<&str>) -> (String, bool) {
    match book_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => (id.to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

/// Composes sequence resolution, the transformer and the upsert writer
#[derive(Clone)]
pub struct Drafting {
    repo: Repository,
    transformer: Arc<dyn ContentTransformer>,
}

impl Drafting {
    pub fn new(repo: Repository, transformer: Arc<dyn ContentTransformer>) -> Self {
        Self { repo, transformer }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Run a drafting unit on its own task. Dropping the returned future
    /// (client gone, request timeout) no longer cancels the unit: it runs
    /// to completion and commits or rolls back on its own outcome.
    pub async fn detached<T, F, Fut>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(Drafting) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(unit(self.clone()))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Drafting task failed: {}", e),
            })?
    }

    /// Append a raw entry at the next sequence of a book, starting a new book
    /// when `book_id` is absent
    pub async fn stage_raw(
        &self,
        user_id: &str,
        book_id: Option<&str>,
        content: &str,
        category: Option<String>,
    ) -> Result<StagedEntry> {
        let (book_id, is_new) = resolve_book_id(book_id);
        let payload = ContentPayload::new(content, category);

        let input_count = with_sequence_retry(|| {
            let user_id = user_id.to_string();
            let book_id = book_id.clone();
            let payload = payload.clone();
            async move {
                run_in_transaction(self.repo.pool().conn(), move |txn| {
                    Box::pin(async move {
                        let known = (!is_new).then_some(book_id.as_str());
                        let count = SequenceResolver::next(txn, &user_id, known).await?;
                        append::<RawEntryEntity, _>(
                            txn,
                            &SlotKey::new(user_id.as_str(), book_id.as_str(), count),
                            &payload,
                        )
                        .await?;
                        Ok(count)
                    })
                })
                .await
            }
        })
        .await?;

        metrics::record_entry_staged("append");
        info!(user_id, book_id = %book_id, input_count, "Raw entry staged");

        Ok(StagedEntry {
            book_id,
            input_count,
        })
    }

    /// Start a brand-new book whose first entry carries the author's profile
    pub async fn start_book(
        &self,
        user_id: &str,
        content: &str,
        category: Option<String>,
    ) -> Result<StagedEntry> {
        let profile = UserProfile::from(self.repo.find_user(user_id).await?);
        self.stage_raw(user_id, None, &profile.annotate(content), category)
            .await
    }

    /// Transform `content` and store both versions, placed per `placement`.
    /// The returned sequence is the transformed entry's.
    pub async fn stage_and_transform(
        &self,
        user_id: &str,
        book_id: Option<&str>,
        content: &str,
        category: Option<String>,
        placement: Placement,
    ) -> Result<StagedEntry> {
        self.transform_and_store(user_id, book_id, content, category, placement, false)
            .await
    }

    /// Like [`Drafting::stage_and_transform`] as a new entry, with the raw
    /// version carrying the author's profile
    pub async fn stage_profiled_and_transform(
        &self,
        user_id: &str,
        book_id: Option<&str>,
        content: &str,
        category: Option<String>,
    ) -> Result<StagedEntry> {
        self.transform_and_store(user_id, book_id, content, category, Placement::default(), true)
            .await
    }

    async fn transform_and_store(
        &self,
        user_id: &str,
        book_id: Option<&str>,
        content: &str,
        category: Option<String>,
        placement: Placement,
        annotate_raw: bool,
    ) -> Result<StagedEntry> {
        let profile = UserProfile::from(self.repo.find_user(user_id).await?);
        let (book_id, is_new) = resolve_book_id(book_id);

        let previous = if is_new {
            None
        } else {
            self.repo.previous_content(user_id, &book_id).await?
        };

        let transformed = self
            .transformer
            .elaborate(&profile, previous.as_deref(), content)
            .await?;

        let raw_text = if annotate_raw {
            profile.annotate(content)
        } else {
            content.to_string()
        };
        let raw = ContentPayload::new(raw_text, category.clone());
        let purified = ContentPayload::new(transformed, category);

        let input_count = with_sequence_retry(|| {
            let user_id = user_id.to_string();
            let book_id = book_id.clone();
            let raw = raw.clone();
            let purified = purified.clone();
            async move {
                run_in_transaction(self.repo.pool().conn(), move |txn| {
                    Box::pin(async move {
                        let max = SequenceResolver::current_max(txn, &user_id, &book_id).await?;
                        let key = SlotKey::new(user_id.as_str(), book_id.as_str(), max + 1);

                        if placement.overwrite_raw {
                            overwrite::<RawEntryEntity, _>(txn, &key.at(max), &raw).await?;
                        } else {
                            append::<RawEntryEntity, _>(txn, &key, &raw).await?;
                        }

                        let purified_count = if placement.transformed_at_latest {
                            max.max(FIRST_SEQUENCE)
                        } else {
                            max + 1
                        };
                        merge::<TransformedEntryEntity, _>(txn, &key.at(purified_count), &purified)
                            .await?;

                        Ok(purified_count)
                    })
                })
                .await
            }
        })
        .await?;

        let mode = if placement.overwrite_raw { "overwrite" } else { "append" };
        metrics::record_entry_staged(mode);
        info!(
            user_id,
            book_id = %book_id,
            input_count,
            overwrite_raw = placement.overwrite_raw,
            "Entry staged and transformed"
        );

        Ok(StagedEntry {
            book_id,
            input_count,
        })
    }

    /// Summarize the interview at `input_count`, or at the book's latest
    /// sequence when absent, and store the summary
    pub async fn summarize(
        &self,
        user_id: &str,
        book_id: &str,
        input_count: Option<i32>,
    ) -> Result<Summary> {
        let input_count = match input_count {
            Some(count) => count,
            None => {
                let latest =
                    SequenceResolver::current_max(self.repo.pool().conn(), user_id, book_id)
                        .await?;
                if latest == 0 {
                    return Err(AppError::NotFound {
                        resource_type: "init_input".to_string(),
                        id: book_id.to_string(),
                    });
                }
                latest
            }
        };

        let turns = self
            .repo
            .chatbot_turns(user_id, book_id, input_count)
            .await?;
        if turns.is_empty() {
            return Err(AppError::SlotNotFound {
                book_id: book_id.to_string(),
                input_count,
            });
        }

        let content = self
            .transformer
            .summarize(&format_transcript(&turns))
            .await?;

        let key = SlotKey::new(user_id, book_id, input_count);
        let payload = ContentPayload::new(content.clone(), None);
        run_in_transaction(self.repo.pool().conn(), move |txn| {
            Box::pin(async move { merge::<ChatbotSummaryEntity, _>(txn, &key, &payload).await })
        })
        .await?;

        metrics::record_summary();
        info!(user_id, book_id, input_count, turns = turns.len(), "Interview summarized");

        Ok(Summary {
            input_count,
            content,
        })
    }

    /// Copy a finalized draft into the library. Returns the number of
    /// sections stored.
    pub async fn store_book(&self, user_id: &str, request: StoreRequest) -> Result<usize> {
        let sections = self
            .repo
            .finalized_sections(user_id, &request.book_id, request.input_count)
            .await?;
        if sections.is_empty() {
            return Err(AppError::NotFound {
                resource_type: "final_input".to_string(),
                id: format!("{}/{}", request.book_id, request.input_count),
            });
        }

        let stored = sections.len();
        let listing = BookListingActiveModel {
            user_id: Set(user_id.to_string()),
            book_id: Set(request.book_id.clone()),
            create_date: Set(today()),
            title: Set(request
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BOOK_TITLE.to_string())),
            category: Set(request.category),
            image_path: Set(request.image_path),
        };
        let rows: Vec<BookSectionActiveModel> = sections
            .into_iter()
            .map(|section| BookSectionActiveModel {
                user_id: Set(section.user_id),
                book_id: Set(section.book_id),
                content_order: Set(section.content_order),
                big_title: Set(section.big_title),
                small_title: Set(section.small_title),
                content: Set(section.content),
                image_path: Set(section.image_path),
            })
            .collect();

        run_in_transaction(self.repo.pool().conn(), move |txn| {
            Box::pin(async move {
                BookListingEntity::insert(listing)
                    .on_conflict(
                        OnConflict::columns([BookListingColumn::UserId, BookListingColumn::BookId])
                            .update_columns([
                                BookListingColumn::CreateDate,
                                BookListingColumn::Title,
                                BookListingColumn::Category,
                                BookListingColumn::ImagePath,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await?;

                BookSectionEntity::insert_many(rows)
                    .on_conflict(
                        OnConflict::columns([
                            BookSectionColumn::UserId,
                            BookSectionColumn::BookId,
                            BookSectionColumn::ContentOrder,
                        ])
                        .update_columns([
                            BookSectionColumn::BigTitle,
                            BookSectionColumn::SmallTitle,
                            BookSectionColumn::Content,
                            BookSectionColumn::ImagePath,
                        ])
                        .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await?;

                Ok(())
            })
        })
        .await?;

        metrics::record_book_stored(stored);
        info!(user_id, book_id = %request.book_id, sections = stored, "Book stored");

        Ok(stored)
    }

    /// Point a finalized section at a new image
    pub async fn attach_section_image(
        &self,
        user_id: &str,
        section: &SectionRef,
        image_path: &str,
    ) -> Result<()> {
        let result = FinalizedSectionEntity::update_many()
            .col_expr(FinalizedSectionColumn::ImagePath, Expr::value(image_path))
            .filter(FinalizedSectionColumn::UserId.eq(user_id))
            .filter(FinalizedSectionColumn::BookId.eq(section.book_id.as_str()))
            .filter(FinalizedSectionColumn::InputCount.eq(section.input_count))
            .filter(FinalizedSectionColumn::ContentOrder.eq(section.content_order))
            .exec(self.repo.pool().conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound {
                resource_type: "final_input".to_string(),
                id: format!(
                    "{}/{}/{}",
                    section.book_id, section.input_count, section.content_order
                ),
            });
        }

        info!(
            user_id,
            book_id = %section.book_id,
            input_count = section.input_count,
            content_order = section.content_order,
            "Section image updated"
        );
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use crate::db::DbPool;
    use crate::transformer::MockTransformer;
    use sea_orm::{ActiveModelTrait, PaginatorTrait};
    use tokio_test::{assert_err, assert_ok};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    async fn seed_user(pool: &DbPool) {
        UserInfoActiveModel {
            id: Set("hong".into()),
            name: Set("홍길동".into()),
            gender: Set("남".into()),
            birth: Set(NaiveDate::from_ymd_opt(1950, 3, 1).unwrap()),
        }
        .insert(pool.conn())
        .await
        .unwrap();
    }

    async fn drafting_with(transformer: Arc<dyn ContentTransformer>) -> (Drafting, DbPool) {
        let pool = memory_pool().await;
        seed_user(&pool).await;
        (Drafting::new(Repository::new(pool.clone()), transformer), pool)
    }

    async fn drafting() -> (Drafting, DbPool) {
        drafting_with(Arc::new(MockTransformer::new())).await
    }

    /// Answers like the mock, after a delay
    struct SlowTransformer(Duration);

    #[async_trait::async_trait]
    impl ContentTransformer for SlowTransformer {
        async fn elaborate(
            &self,
            profile: &UserProfile,
            previous: Option<&str>,
            input: &str,
        ) -> Result<String> {
            tokio::time::sleep(self.0).await;
            MockTransformer::new().elaborate(profile, previous, input).await
        }

        async fn summarize(&self, transcript: &str) -> Result<String> {
            tokio::time::sleep(self.0).await;
            MockTransformer::new().summarize(transcript).await
        }

        fn model_name(&self) -> &str {
            "slow-mock"
        }
    }

    async fn raw_entries(pool: &DbPool) -> Vec<RawEntry> {
        RawEntryEntity::find().all(pool.conn()).await.unwrap()
    }

    async fn seed_section(pool: &DbPool, book: &str, order: i32) {
        FinalizedSectionActiveModel {
            user_id: Set("hong".into()),
            book_id: Set(book.into()),
            input_count: Set(1),
            content_order: Set(order),
            big_title: Set(format!("장 {}", order)),
            small_title: Set("소제목".into()),
            content: Set("본문".into()),
            image_path: Set(None),
        }
        .insert(pool.conn())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_first_entry_of_new_book() {
        let (drafting, pool) = drafting().await;

        let staged = drafting
            .stage_raw("hong", None, "이름: 홍길동...", Some("family".into()))
            .await
            .unwrap();

        assert_eq!(staged.input_count, 1);
        assert!(Uuid::parse_str(&staged.book_id).is_ok());

        let rows = raw_entries(&pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].input_count, 1);
        assert_eq!(rows[0].category.as_deref(), Some("family"));
    }

    #[tokio::test]
    async fn test_second_entry_gets_next_sequence() {
        let (drafting, _pool) = drafting().await;

        let first = drafting.stage_raw("hong", None, "one", None).await.unwrap();
        let second = drafting
            .stage_raw("hong", Some(&first.book_id), "two", None)
            .await
            .unwrap();

        assert_eq!(second.book_id, first.book_id);
        assert_eq!(second.input_count, 2);
    }

    #[tokio::test]
    async fn test_blank_book_id_starts_new_book() {
        let (drafting, _pool) = drafting().await;
        let staged = drafting.stage_raw("hong", Some("  "), "one", None).await.unwrap();
        assert!(Uuid::parse_str(&staged.book_id).is_ok());
        assert_eq!(staged.input_count, 1);
    }

    #[tokio::test]
    async fn test_taken_slot_is_retried_on_a_fresh_sequence() {
        let pool = memory_pool().await;
        let conn = pool.conn();
        let key = |count| SlotKey::new("hong", "b1", count);
        append::<RawEntryEntity, _>(conn, &key(1), &ContentPayload::new("first", None))
            .await
            .unwrap();

        let attempts = AtomicU32::new(0);
        let landed = with_sequence_retry(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let payload = ContentPayload::new("mine", None);
            async move {
                // first attempt claims a slot another writer commits meanwhile
                let seen = SequenceResolver::current_max(conn, "hong", "b1").await?;
                if attempt == 1 {
                    append::<RawEntryEntity, _>(
                        conn,
                        &key(seen + 1),
                        &ContentPayload::new("theirs", None),
                    )
                    .await?;
                }
                run_in_transaction(conn, move |txn| {
                    Box::pin(async move {
                        let count = if attempt == 1 {
                            seen + 1
                        } else {
                            SequenceResolver::next(txn, "hong", Some("b1")).await?
                        };
                        append::<RawEntryEntity, _>(txn, &key(count), &payload).await?;
                        Ok(count)
                    })
                })
                .await
            }
        })
        .await
        .unwrap();

        assert_eq!(landed, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let rows = raw_entries(&pool).await;
        assert_eq!(rows.len(), 3);
        let theirs = rows.iter().find(|r| r.input_count == 2).unwrap();
        assert_eq!(theirs.content, "theirs");
        let mine = rows.iter().find(|r| r.input_count == 3).unwrap();
        assert_eq!(mine.content, "mine");
    }

    #[tokio::test]
    async fn test_detached_unit_outlives_dropped_caller() {
        let transformer = Arc::new(SlowTransformer(Duration::from_millis(200)));
        let (drafting, pool) = drafting_with(transformer).await;

        let caller = drafting.detached(|drafting| async move {
            drafting
                .stage_and_transform("hong", None, "입력", None, Placement::default())
                .await
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), caller)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(raw_entries(&pool).await.len(), 1);
        assert_eq!(
            TransformedEntryEntity::find().count(pool.conn()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_conflict() {
        let mut calls = 0;
        let result: Result<()> = with_sequence_retry(|| {
            calls += 1;
            async {
                Err(AppError::Database(sea_orm::DbErr::Custom(
                    "UNIQUE constraint failed: init_input.user_id".into(),
                )))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::SlotConflict { .. })));
        assert_eq!(calls, MAX_SEQUENCE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_start_book_prefixes_profile() {
        let (drafting, pool) = drafting().await;

        let staged = drafting.start_book("hong", "학교에 다녔다", None).await.unwrap();
        assert_eq!(staged.input_count, 1);

        let rows = raw_entries(&pool).await;
        assert_eq!(
            rows[0].content,
            "이름: 홍길동, 성별: 남, 생일: 1950-03-01, 입력텍스트: 학교에 다녔다"
        );
    }

    #[tokio::test]
    async fn test_start_book_unknown_user() {
        let (drafting, pool) = drafting().await;
        let err = drafting.start_book("nobody", "text", None).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound { .. }));
        assert!(raw_entries(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_stage_and_transform_appends_both_versions() {
        let (drafting, pool) = drafting().await;

        let staged = drafting
            .stage_and_transform("hong", None, "입력", Some("family".into()), Placement::default())
            .await
            .unwrap();
        assert_eq!(staged.input_count, 1);

        let purified = TransformedEntryEntity::find().all(pool.conn()).await.unwrap();
        assert_eq!(purified.len(), 1);
        assert_eq!(purified[0].input_count, 1);
        assert_eq!(purified[0].content, "홍길동의 이야기: 입력");
        assert_eq!(raw_entries(&pool).await[0].content, "입력");
    }

    #[tokio::test]
    async fn test_profiled_entry_keeps_plain_input_for_transformer() {
        let (drafting, pool) = drafting().await;
        let first = drafting.stage_raw("hong", None, "zero", None).await.unwrap();

        let staged = drafting
            .stage_profiled_and_transform("hong", Some(&first.book_id), "입력", None)
            .await
            .unwrap();
        assert_eq!(staged.input_count, 2);

        let raw = RawEntryEntity::find_by_id(("hong".to_string(), first.book_id.clone(), 2))
            .one(pool.conn())
            .await
            .unwrap()
            .unwrap();
        assert!(raw.content.starts_with("이름: 홍길동"));
        let purified = TransformedEntryEntity::find().all(pool.conn()).await.unwrap();
        assert_eq!(purified[0].content, "홍길동의 이야기: 입력");
    }

    #[tokio::test]
    async fn test_correction_overwrites_latest_raw_entry() {
        let (drafting, pool) = drafting().await;
        let first = drafting
            .stage_and_transform("hong", None, "초안", None, Placement::default())
            .await
            .unwrap();

        let placement = Placement {
            overwrite_raw: true,
            transformed_at_latest: true,
        };
        let corrected = drafting
            .stage_and_transform("hong", Some(&first.book_id), "수정본", None, placement)
            .await
            .unwrap();

        assert_eq!(corrected.input_count, 1);
        let rows = raw_entries(&pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "수정본");
        assert_eq!(
            TransformedEntryEntity::find().count(pool.conn()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_lagging_transformed_entry() {
        let (drafting, pool) = drafting().await;
        let first = drafting
            .stage_and_transform("hong", None, "하나", None, Placement::default())
            .await
            .unwrap();

        let placement = Placement {
            overwrite_raw: false,
            transformed_at_latest: true,
        };
        let staged = drafting
            .stage_and_transform("hong", Some(&first.book_id), "둘", None, placement)
            .await
            .unwrap();

        // raw lands at 2, transformed replaces 1
        assert_eq!(staged.input_count, 1);
        assert_eq!(raw_entries(&pool).await.len(), 2);
        let purified = TransformedEntryEntity::find().all(pool.conn()).await.unwrap();
        assert_eq!(purified.len(), 1);
        assert_eq!(purified[0].content, "홍길동의 이야기: 둘");
    }

    #[tokio::test]
    async fn test_correction_without_entries_is_not_found() {
        let (drafting, pool) = drafting().await;
        let placement = Placement {
            overwrite_raw: true,
            transformed_at_latest: false,
        };
        let err = drafting
            .stage_and_transform("hong", Some("empty-book"), "x", None, placement)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SlotNotFound { .. }));
        assert_eq!(
            TransformedEntryEntity::find().count(pool.conn()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_transformer_failure_writes_nothing() {
        let (drafting, pool) = drafting_with(Arc::new(MockTransformer::failing())).await;

        let err = drafting
            .stage_and_transform("hong", None, "입력", None, Placement::default())
            .await
            .unwrap_err();

        assert_eq!(err.status_code().as_u16(), 500);
        assert!(raw_entries(&pool).await.is_empty());
        assert_eq!(
            TransformedEntryEntity::find().count(pool.conn()).await.unwrap(),
            0
        );
    }

    async fn seed_turns(pool: &DbPool, book: &str) {
        for (quest_num, question, response) in [(1, "어린 시절", "시골"), (2, "학교", "서울")] {
            ChatbotTurnActiveModel {
                user_id: Set("hong".into()),
                book_id: Set(book.into()),
                input_count: Set(1),
                quest_num: Set(quest_num),
                question: Set(question.into()),
                response: Set(response.into()),
            }
            .insert(pool.conn())
            .await
            .unwrap();
        }
    }

    #[test]
    fn test_transcript_format() {
        let turn = |quest_num: i32, q: &str, a: &str| ChatbotTurn {
            user_id: "hong".into(),
            book_id: "b1".into(),
            input_count: 1,
            quest_num,
            question: q.into(),
            response: a.into(),
        };
        let transcript = format_transcript(&[turn(1, "q1", "a1"), turn(2, "q2", "a2")]);
        assert_eq!(transcript, "q1, Assistant: a1 User: q2, Assistant: a2");
    }

    #[tokio::test]
    async fn test_summarize_stores_summary() {
        let (drafting, pool) = drafting().await;
        seed_turns(&pool, "b1").await;

        let summary = drafting.summarize("hong", "b1", Some(1)).await.unwrap();
        assert_eq!(summary.input_count, 1);
        assert!(summary.content.starts_with("요약: 어린 시절, Assistant: 시골"));

        // summarizing again overwrites in place
        assert_ok!(drafting.summarize("hong", "b1", Some(1)).await);
        let rows = ChatbotSummaryEntity::find().all(pool.conn()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, summary.content);
    }

    #[tokio::test]
    async fn test_summarize_defaults_to_latest_sequence() {
        let (drafting, pool) = drafting().await;
        seed_turns(&pool, "b1").await;
        drafting.stage_raw("hong", Some("b1"), "raw", None).await.unwrap();

        let summary = drafting.summarize("hong", "b1", None).await.unwrap();
        assert_eq!(summary.input_count, 1);

        let err = drafting.summarize("hong", "empty", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_summarize_without_transcript() {
        let (drafting, pool) = drafting().await;
        let err = drafting.summarize("hong", "b1", Some(4)).await.unwrap_err();
        assert!(matches!(err, AppError::SlotNotFound { .. }));
        assert_eq!(
            ChatbotSummaryEntity::find().count(pool.conn()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_store_without_sections_is_not_found() {
        let (drafting, pool) = drafting().await;
        let request = StoreRequest {
            book_id: "b1".into(),
            input_count: 1,
            ..StoreRequest::default()
        };

        let err = drafting.store_book("hong", request).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
        assert_eq!(BookListingEntity::find().count(pool.conn()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_copies_sections_and_lists_book() {
        let (drafting, pool) = drafting().await;
        for order in 1..=3 {
            seed_section(&pool, "b1", order).await;
        }
        let request = StoreRequest {
            book_id: "b1".into(),
            input_count: 1,
            category: Some("family".into()),
            ..StoreRequest::default()
        };

        assert_eq!(drafting.store_book("hong", request.clone()).await.unwrap(), 3);
        // storing again updates in place
        assert_eq!(drafting.store_book("hong", request).await.unwrap(), 3);

        let listings = BookListingEntity::find().all(pool.conn()).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, DEFAULT_BOOK_TITLE);
        assert_eq!(listings[0].create_date, today());

        let sections = drafting.repository().book_sections("hong", "b1").await.unwrap();
        let orders: Vec<i32> = sections.iter().map(|s| s.content_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_attach_section_image() {
        let (drafting, pool) = drafting().await;
        seed_section(&pool, "b1", 1).await;
        seed_section(&pool, "b1", 2).await;

        let section = SectionRef {
            book_id: "b1".into(),
            input_count: 1,
            content_order: 2,
        };
        assert_ok!(
            drafting
                .attach_section_image("hong", &section, "/uploads/a.png")
                .await
        );

        let sections = drafting.repository().finalized_sections("hong", "b1", 1).await.unwrap();
        assert_eq!(sections[0].image_path, None);
        assert_eq!(sections[1].image_path.as_deref(), Some("/uploads/a.png"));

        let missing = SectionRef {
            content_order: 9,
            ..section
        };
        assert_err!(
            drafting
                .attach_section_image("hong", &missing, "/uploads/a.png")
                .await
        );
    }
}
