// src/validation.rs
//! Field checks run before a request reaches the store.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{filters::Filters, models::NewPoll};

pub const MAX_QUESTION_BYTES: usize = 500;
pub const MAX_DESCRIPTION_BYTES: usize = 1000;
pub const MAX_OPTION_BYTES: usize = 500;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 20;
pub const MAX_PAGE: i64 = 10_000_000;

#[derive(Debug, Default)]
pub struct Validator {
    pub errors: HashMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Keeps the first message recorded for a key.
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }
}

pub fn validate_question(v: &mut Validator, question: &str) {
    v.check(!question.trim().is_empty(), "question", "must be provided");
    v.check(
        question.len() <= MAX_QUESTION_BYTES,
        "question",
        "must not be more than 500 bytes long",
    );
}

pub fn validate_description(v: &mut Validator, description: Option<&str>) {
    if let Some(description) = description {
        v.check(
            description.len() <= MAX_DESCRIPTION_BYTES,
            "description",
            "must not be more than 1000 bytes long",
        );
    }
}

pub fn validate_expires_at(v: &mut Validator, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
    if let Some(expires_at) = expires_at {
        v.check(expires_at > now, "expires_at", "must be in the future");
    }
}

pub fn validate_option_value(v: &mut Validator, value: &str) {
    v.check(!value.trim().is_empty(), "options", "option value must be provided");
    v.check(
        value.len() <= MAX_OPTION_BYTES,
        "options",
        "option value must not be more than 500 bytes long",
    );
}

/// Checks the full set of option values a poll would end up with.
pub fn validate_option_set<'a, I>(v: &mut Validator, values: I)
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = values.into_iter().collect();

    v.check(values.len() >= MIN_OPTIONS, "options", "must contain at least 2 options");
    v.check(values.len() <= MAX_OPTIONS, "options", "must not contain more than 20 options");

    for value in &values {
        validate_option_value(v, value);
    }

    let unique: HashSet<&str> = values.iter().map(|value| value.trim()).collect();
    v.check(unique.len() == values.len(), "options", "must not contain duplicate values");
}

pub fn validate_new_poll(v: &mut Validator, poll: &NewPoll, now: DateTime<Utc>) {
    validate_question(v, &poll.question);
    validate_description(v, poll.description.as_deref());
    validate_expires_at(v, poll.expires_at, now);
    validate_option_set(v, poll.options.iter().map(|option| option.value.as_str()));
}

pub fn validate_filters(v: &mut Validator, filters: &Filters, max_page_size: i64) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= max_page_size,
        "page_size",
        &format!("must be a maximum of {max_page_size}"),
    );
    v.check(filters.resolve_sort().is_ok(), "sort", "invalid sort value");
}
