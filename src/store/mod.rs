// src/store/mod.rs
//! Poll persistence.
//!
//! One trait per component: [`PollStore`] owns the poll aggregate,
//! [`OptionStore`] the options and their tallies, [`VoteLedger`] the
//! (poll, address) dedup records. [`Store`] combines them and adds the
//! transactional vote.
use std::{collections::HashSet, net::IpAddr};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::StoreResult,
    filters::{Filters, Metadata},
    models::{NewOption, NewPoll, OptionPosition, Poll, PollOption},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persists the poll, its options and its token hash as one unit.
    /// Returns the stored poll and the plaintext token.
    async fn create(&self, poll: NewPoll) -> StoreResult<(Poll, String)>;

    async fn get(&self, id: &str) -> StoreResult<Poll>;

    /// Overwrites question, description and expiry. Performs no authorization.
    async fn update(&self, poll: &Poll) -> StoreResult<Poll>;

    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Public polls matching `search` (all when empty), one page at a time.
    async fn list(&self, search: &str, filters: &Filters) -> StoreResult<(Vec<Poll>, Metadata)>;

    async fn voters_for(&self, poll_id: &str) -> StoreResult<HashSet<IpAddr>>;

    /// Resolves a plaintext token to its poll. Unknown and wrong tokens are
    /// both `NotFound`.
    async fn lookup_by_token(&self, plaintext: &str) -> StoreResult<Uuid>;
}

#[async_trait]
pub trait OptionStore: Send + Sync {
    /// Adds an option and advances the parent poll's `updated_at`.
    async fn insert_option(&self, option: NewOption, poll_id: &str) -> StoreResult<PollOption>;

    async fn update_option_value(&self, option_id: &str, value: &str) -> StoreResult<()>;

    /// Applies every position or none of them.
    async fn update_option_positions(&self, positions: &[OptionPosition]) -> StoreResult<()>;

    /// Atomically adds one vote to the option.
    async fn vote(&self, option_id: &str) -> StoreResult<()>;

    async fn delete_option(&self, option_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait VoteLedger: Send + Sync {
    async fn has_voted(&self, poll_id: &str, address: IpAddr) -> StoreResult<bool>;

    /// Fails with `Conflict` when the address already voted on the poll.
    async fn record_vote(&self, poll_id: &str, address: IpAddr) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: PollStore + OptionStore + VoteLedger {
    /// Records the voter and increments the option in one transaction.
    /// The option must belong to `poll_id`.
    async fn cast_vote(&self, poll_id: &str, option_id: &str, address: IpAddr)
        -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Lowercased alphanumeric words, the same split the `simple` text search config uses.
pub(crate) fn search_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}
