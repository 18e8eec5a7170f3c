// src/store/memory.rs
//! In-process store with the same semantics as [`super::PgStore`].
//!
//! A single mutex guards all tables, so every operation (including the vote
//! increment) is atomic with respect to the others.
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{search_terms, OptionStore, PollStore, Store, VoteLedger};
use crate::{
    error::{StoreError, StoreResult},
    filters::{build_metadata, Filters, Metadata, SortDirection, SortField},
    models::{parse_id, sort_options, NewOption, NewPoll, OptionPosition, Poll, PollOption},
    token,
};

#[derive(Default)]
struct Tables {
    /// Polls are kept without options; options live in their own table.
    polls: HashMap<Uuid, Poll>,
    options: HashMap<Uuid, (Uuid, PollOption)>,
    tokens: HashMap<Uuid, Vec<u8>>,
    votes: HashSet<(Uuid, IpAddr)>,
}

impl Tables {
    fn assemble(&self, poll: &Poll) -> Poll {
        let mut options: Vec<PollOption> = self
            .options
            .values()
            .filter(|(poll_id, _)| *poll_id == poll.id)
            .map(|(_, option)| option.clone())
            .collect();
        sort_options(&mut options);

        Poll {
            options,
            ..poll.clone()
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Mirrors the CHECK constraints on the polls and poll_options tables.
fn check_question(question: &str) -> StoreResult<()> {
    if question.is_empty() {
        return Err(StoreError::ConstraintViolation("polls_question_check".into()));
    }
    Ok(())
}

fn check_vote_count(vote_count: i64) -> StoreResult<()> {
    if vote_count < 0 {
        return Err(StoreError::ConstraintViolation("poll_options_vote_count_check".into()));
    }
    Ok(())
}

fn matches_search(question: &str, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }

    let wanted = search_terms(search);
    if wanted.is_empty() {
        return false;
    }

    let words = search_terms(question);
    wanted.iter().all(|term| words.contains(term))
}

fn compare_by(field: SortField, a: &Poll, b: &Poll) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Question => a.question.cmp(&b.question),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        // Missing expiry sorts last ascending, first descending.
        SortField::ExpiresAt => (a.expires_at.is_none(), a.expires_at)
            .cmp(&(b.expires_at.is_none(), b.expires_at)),
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create(&self, new_poll: NewPoll) -> StoreResult<(Poll, String)> {
        check_question(&new_poll.question)?;
        for option in &new_poll.options {
            check_vote_count(option.vote_count)?;
        }

        let now = Utc::now();
        let issued = token::issue();

        let mut options: Vec<PollOption> = new_poll
            .options
            .into_iter()
            .map(|option| PollOption {
                id: Uuid::new_v4(),
                value: option.value,
                position: option.position,
                vote_count: option.vote_count,
            })
            .collect();

        let poll = Poll {
            id: Uuid::new_v4(),
            question: new_poll.question,
            description: new_poll.description,
            options: Vec::new(),
            created_at: now,
            updated_at: now,
            expires_at: new_poll.expires_at,
            results_visibility: new_poll.results_visibility,
            is_private: new_poll.is_private,
        };

        let mut tables = self.tables();
        for option in &options {
            tables.options.insert(option.id, (poll.id, option.clone()));
        }
        tables.tokens.insert(poll.id, issued.hash);
        tables.polls.insert(poll.id, poll.clone());
        drop(tables);

        debug!(poll_id = %poll.id, "poll created");

        sort_options(&mut options);
        Ok((Poll { options, ..poll }, issued.plaintext))
    }

    async fn get(&self, id: &str) -> StoreResult<Poll> {
        let id = parse_id(id)?;
        let tables = self.tables();

        let poll = tables.polls.get(&id).ok_or(StoreError::NotFound)?;
        let poll = tables.assemble(poll);
        if poll.options.is_empty() {
            return Err(StoreError::NotFound);
        }

        Ok(poll)
    }

    async fn update(&self, poll: &Poll) -> StoreResult<Poll> {
        let mut tables = self.tables();
        let stored = tables.polls.get_mut(&poll.id).ok_or(StoreError::NotFound)?;
        check_question(&poll.question)?;

        stored.question = poll.question.clone();
        stored.description = poll.description.clone();
        stored.expires_at = poll.expires_at;
        stored.updated_at = Utc::now().max(stored.created_at);

        Ok(Poll {
            updated_at: stored.updated_at,
            ..poll.clone()
        })
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = parse_id(id)?;
        let mut tables = self.tables();

        tables.polls.remove(&id).ok_or(StoreError::NotFound)?;
        tables.options.retain(|_, (poll_id, _)| *poll_id != id);
        tables.tokens.remove(&id);
        tables.votes.retain(|(poll_id, _)| *poll_id != id);

        debug!(poll_id = %id, "poll deleted");
        Ok(())
    }

    async fn list(&self, search: &str, filters: &Filters) -> StoreResult<(Vec<Poll>, Metadata)> {
        let (field, direction) = filters.resolve_sort()?;
        let tables = self.tables();

        let mut polls: Vec<Poll> = tables
            .polls
            .values()
            .filter(|poll| !poll.is_private && matches_search(&poll.question, search))
            .map(|poll| tables.assemble(poll))
            .filter(|poll| !poll.options.is_empty())
            .collect();
        drop(tables);

        polls.sort_by(|a, b| {
            let ordering = match direction {
                SortDirection::Ascending => compare_by(field, a, b),
                SortDirection::Descending => compare_by(field, b, a),
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = polls.len() as i64;
        let page = polls
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .collect();

        Ok((page, build_metadata(total, filters.page, filters.page_size)))
    }

    async fn voters_for(&self, poll_id: &str) -> StoreResult<HashSet<IpAddr>> {
        let poll_id = parse_id(poll_id)?;

        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|(id, _)| *id == poll_id)
            .map(|(_, address)| *address)
            .collect())
    }

    async fn lookup_by_token(&self, plaintext: &str) -> StoreResult<Uuid> {
        self.tables()
            .tokens
            .iter()
            .find(|(_, hash)| token::verify(plaintext, hash))
            .map(|(poll_id, _)| *poll_id)
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl OptionStore for MemoryStore {
    async fn insert_option(&self, option: NewOption, poll_id: &str) -> StoreResult<PollOption> {
        let poll_id = parse_id(poll_id)?;
        let mut tables = self.tables();

        let poll = tables.polls.get_mut(&poll_id).ok_or(StoreError::NotFound)?;
        check_vote_count(option.vote_count)?;
        poll.updated_at = Utc::now().max(poll.created_at);

        let option = PollOption {
            id: Uuid::new_v4(),
            value: option.value,
            position: option.position,
            vote_count: option.vote_count,
        };
        tables.options.insert(option.id, (poll_id, option.clone()));

        Ok(option)
    }

    async fn update_option_value(&self, option_id: &str, value: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;
        let mut tables = self.tables();

        let (_, option) = tables.options.get_mut(&option_id).ok_or(StoreError::NotFound)?;
        option.value = value.to_string();

        Ok(())
    }

    async fn update_option_positions(&self, positions: &[OptionPosition]) -> StoreResult<()> {
        let mut tables = self.tables();

        if positions.iter().any(|p| !tables.options.contains_key(&p.id)) {
            return Err(StoreError::NotFound);
        }

        for target in positions {
            if let Some((_, option)) = tables.options.get_mut(&target.id) {
                option.position = target.position;
            }
        }

        Ok(())
    }

    async fn vote(&self, option_id: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;
        let mut tables = self.tables();

        let (_, option) = tables.options.get_mut(&option_id).ok_or(StoreError::NotFound)?;
        option.vote_count += 1;

        Ok(())
    }

    async fn delete_option(&self, option_id: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;

        self.tables()
            .options
            .remove(&option_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl VoteLedger for MemoryStore {
    async fn has_voted(&self, poll_id: &str, address: IpAddr) -> StoreResult<bool> {
        let poll_id = parse_id(poll_id)?;
        let address = address.to_canonical();
        Ok(self.tables().votes.contains(&(poll_id, address)))
    }

    async fn record_vote(&self, poll_id: &str, address: IpAddr) -> StoreResult<()> {
        let poll_id = parse_id(poll_id)?;
        let address = address.to_canonical();
        let mut tables = self.tables();

        if !tables.polls.contains_key(&poll_id) {
            return Err(StoreError::NotFound);
        }
        if !tables.votes.insert((poll_id, address)) {
            return Err(StoreError::Conflict);
        }

        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        address: IpAddr,
    ) -> StoreResult<()> {
        let poll_id = parse_id(poll_id)?;
        let option_id = parse_id(option_id)?;
        let address = address.to_canonical();
        let mut tables = self.tables();

        if !tables.polls.contains_key(&poll_id) {
            return Err(StoreError::NotFound);
        }
        if tables.votes.contains(&(poll_id, address)) {
            return Err(StoreError::Conflict);
        }

        match tables.options.get_mut(&option_id) {
            Some((owner, option)) if *owner == poll_id => option.vote_count += 1,
            _ => return Err(StoreError::NotFound),
        }
        tables.votes.insert((poll_id, address));

        debug!(poll_id = %poll_id, option_id = %option_id, "vote cast");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
