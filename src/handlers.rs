// handlers.rs
use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, StoreError},
    filters::{Filters, Metadata},
    models::{
        parse_id, NewOption, NewPoll, OptionPosition, Poll, PollOption, ResultsVisibility,
    },
    validation::{self, Validator},
    AppState,
};

const DEFAULT_SORT: &str = "-created_at";

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: Uuid,
    pub value: String,
    pub position: i32,
    /// `None` when results are hidden from the caller.
    pub vote_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PollView {
    pub id: Uuid,
    pub question: String,
    pub description: Option<String>,
    pub options: Vec<OptionView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub results_visibility: ResultsVisibility,
    pub is_private: bool,
}

impl PollView {
    pub fn new(poll: Poll, show_results: bool) -> Self {
        let options = poll
            .options
            .into_iter()
            .map(|option| OptionView {
                id: option.id,
                value: option.value,
                position: option.position,
                vote_count: show_results.then_some(option.vote_count),
            })
            .collect();

        Self {
            id: poll.id,
            question: poll.question,
            description: poll.description,
            options,
            created_at: poll.created_at,
            updated_at: poll.updated_at,
            expires_at: poll.expires_at,
            results_visibility: poll.results_visibility,
            is_private: poll.is_private,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PollList {
    pub polls: Vec<PollView>,
    pub metadata: Metadata,
}

fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(input)| input)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn failed(v: Validator) -> ApiError {
    ApiError::Validation(v.errors)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Loads the poll and checks the bearer token belongs to it.
async fn owned_poll(state: &AppState, headers: &HeaderMap, id: &str) -> Result<Poll, ApiError> {
    let poll = state.store.get(id).await?;
    let token = bearer_token(headers).ok_or(ApiError::InvalidToken)?;

    match state.store.lookup_by_token(token).await {
        Ok(owner) if owner == poll.id => Ok(poll),
        Ok(_) | Err(StoreError::NotFound) => Err(ApiError::InvalidToken),
        Err(e) => Err(e.into()),
    }
}

fn option_of(poll: &Poll, option_id: &str) -> Result<PollOption, ApiError> {
    let option_id = parse_id(option_id)?;
    poll.option(option_id).cloned().ok_or(ApiError::NotFound)
}

pub async fn healthcheck(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.store.health_check().await?;

    Ok(Json(json!({
        "status": "available",
        "environment": state.config.env,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

fn read_int(v: &mut Validator, key: &str, raw: Option<&str>, default: i64) -> i64 {
    match raw.filter(|s| !s.is_empty()) {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

pub async fn list_polls(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PollList>, ApiError> {
    let mut v = Validator::new();

    let page = read_int(&mut v, "page", query.page.as_deref(), 1);
    let page_size = read_int(
        &mut v,
        "page_size",
        query.page_size.as_deref(),
        state.config.default_page_size,
    );
    let sort = query.sort.filter(|s| !s.is_empty()).unwrap_or_else(|| DEFAULT_SORT.into());
    let filters = Filters::new(page, page_size, sort);

    validation::validate_filters(&mut v, &filters, state.config.max_page_size);
    if !v.valid() {
        return Err(failed(v));
    }

    let search = query.search.unwrap_or_default();
    let (polls, metadata) = state.store.list(search.trim(), &filters).await?;

    let now = Utc::now();
    let polls = polls
        .into_iter()
        .map(|poll| {
            let show = poll.results_visible(false, now);
            PollView::new(poll, show)
        })
        .collect();

    Ok(Json(PollList { polls, metadata }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollInput {
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<NewOption>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results_visibility: ResultsVisibility,
    #[serde(default)]
    pub is_private: bool,
}

pub async fn create_poll(
    State(state): State<AppState>,
    payload: Result<Json<CreatePollInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = read_json(payload)?;

    let new_poll = NewPoll {
        question: input.question,
        description: input.description,
        options: input.options,
        expires_at: input.expires_at,
        results_visibility: input.results_visibility,
        is_private: input.is_private,
    };

    let mut v = Validator::new();
    validation::validate_new_poll(&mut v, &new_poll, Utc::now());
    if !v.valid() {
        return Err(failed(v));
    }

    let (poll, token) = state.store.create(new_poll).await?;
    info!(poll_id = %poll.id, "poll created");

    let location = format!("/v1/polls/{}", poll.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "poll": PollView::new(poll, true), "token": token })),
    ))
}

pub async fn show_poll(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = state.store.get(&id).await?;

    let has_voted = match poll.results_visibility {
        ResultsVisibility::AfterVoting => state.store.has_voted(&id, addr.ip()).await?,
        _ => false,
    };
    let show = poll.results_visible(has_voted, Utc::now());

    Ok(Json(json!({ "poll": PollView::new(poll, show) })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePollInput {
    pub question: Option<String>,
    /// `Some(None)` is an explicit `null`, which clears the description.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub async fn update_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdatePollInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut poll = owned_poll(&state, &headers, &id).await?;
    let input = read_json(payload)?;

    if let Some(question) = input.question {
        poll.question = question;
    }
    if let Some(description) = input.description {
        poll.description = description;
    }
    if let Some(expires_at) = input.expires_at {
        poll.expires_at = Some(expires_at);
    }

    let mut v = Validator::new();
    validation::validate_question(&mut v, &poll.question);
    validation::validate_description(&mut v, poll.description.as_deref());
    validation::validate_expires_at(&mut v, input.expires_at, Utc::now());
    if !v.valid() {
        return Err(failed(v));
    }

    let poll = state.store.update(&poll).await?;
    Ok(Json(json!({ "poll": PollView::new(poll, true) })))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let poll = owned_poll(&state, &headers, &id).await?;
    state.store.delete(&id).await?;
    info!(poll_id = %poll.id, "poll deleted");

    Ok(Json(json!({ "message": "poll successfully deleted" })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddOptionInput {
    pub value: String,
    #[serde(default)]
    pub position: i32,
}

pub async fn add_option(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<AddOptionInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = owned_poll(&state, &headers, &id).await?;
    let input = read_json(payload)?;

    let mut v = Validator::new();
    validation::validate_option_set(
        &mut v,
        poll.options
            .iter()
            .map(|option| option.value.as_str())
            .chain(std::iter::once(input.value.as_str())),
    );
    if !v.valid() {
        return Err(failed(v));
    }

    let option = state
        .store
        .insert_option(NewOption::new(input.value, input.position), &id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "option added successfully", "option": option })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOptionInput {
    pub value: String,
}

pub async fn update_option(
    State(state): State<AppState>,
    Path((id, option_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<UpdateOptionInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = owned_poll(&state, &headers, &id).await?;
    let option = option_of(&poll, &option_id)?;
    let input = read_json(payload)?;

    let mut v = Validator::new();
    validation::validate_option_set(
        &mut v,
        poll.options.iter().map(|other| {
            if other.id == option.id {
                input.value.as_str()
            } else {
                other.value.as_str()
            }
        }),
    );
    if !v.valid() {
        return Err(failed(v));
    }

    state.store.update_option_value(&option_id, &input.value).await?;
    Ok(Json(json!({ "message": "option updated successfully" })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositionInput {
    pub options: Vec<OptionPosition>,
}

pub async fn reposition_options(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RepositionInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = owned_poll(&state, &headers, &id).await?;
    let input = read_json(payload)?;

    let mut v = Validator::new();
    v.check(!input.options.is_empty(), "options", "must contain at least one option");
    if !v.valid() {
        return Err(failed(v));
    }
    if input.options.iter().any(|target| poll.option(target.id).is_none()) {
        return Err(ApiError::NotFound);
    }

    state.store.update_option_positions(&input.options).await?;
    Ok(Json(json!({ "message": "options repositioned successfully" })))
}

pub async fn delete_option(
    State(state): State<AppState>,
    Path((id, option_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let poll = owned_poll(&state, &headers, &id).await?;
    option_of(&poll, &option_id)?;

    if poll.options.len() <= validation::MIN_OPTIONS {
        return Err(ApiError::Unprocessable(
            "poll must keep at least 2 options".to_string(),
        ));
    }

    state.store.delete_option(&option_id).await?;
    Ok(Json(json!({ "message": "option successfully deleted" })))
}

pub async fn vote(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((id, option_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = state.store.get(&id).await?;
    option_of(&poll, &option_id)?;

    if poll.is_expired(Utc::now()) {
        return Err(ApiError::Unprocessable("poll has expired".to_string()));
    }

    state.store.cast_vote(&id, &option_id, addr.ip()).await?;
    Ok(Json(json!({ "message": "vote successful" })))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
