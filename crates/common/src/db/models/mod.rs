//! SeaORM entity models
//!
//! Database entities for YouBook. Every table uses its composite natural
//! key as the primary key.

pub mod book_listing;
pub mod book_section;
pub mod chatbot_summary;
pub mod chatbot_turn;
pub mod finalized_section;
pub mod raw_entry;
pub mod transformed_entry;
pub mod user_info;

pub use user_info::{
    Entity as UserInfoEntity,
    Model as UserInfo,
    ActiveModel as UserInfoActiveModel,
    Column as UserInfoColumn,
};

pub use raw_entry::{
    Entity as RawEntryEntity,
    Model as RawEntry,
    ActiveModel as RawEntryActiveModel,
    Column as RawEntryColumn,
};

pub use transformed_entry::{
    Entity as TransformedEntryEntity,
    Model as TransformedEntry,
    ActiveModel as TransformedEntryActiveModel,
    Column as TransformedEntryColumn,
};

pub use chatbot_turn::{
    Entity as ChatbotTurnEntity,
    Model as ChatbotTurn,
    ActiveModel as ChatbotTurnActiveModel,
    Column as ChatbotTurnColumn,
};

pub use chatbot_summary::{
    Entity as ChatbotSummaryEntity,
    Model as ChatbotSummary,
    ActiveModel as ChatbotSummaryActiveModel,
    Column as ChatbotSummaryColumn,
};

pub use finalized_section::{
    Entity as FinalizedSectionEntity,
    Model as FinalizedSection,
    ActiveModel as FinalizedSectionActiveModel,
    Column as FinalizedSectionColumn,
};

pub use book_listing::{
    Entity as BookListingEntity,
    Model as BookListing,
    ActiveModel as BookListingActiveModel,
    Column as BookListingColumn,
};

pub use book_section::{
    Entity as BookSectionEntity,
    Model as BookSection,
    ActiveModel as BookSectionActiveModel,
    Column as BookSectionColumn,
};
