// src/store/postgres.rs
use std::{collections::HashSet, future::Future, net::IpAddr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{OptionStore, PollStore, Store, VoteLedger};
use crate::{
    error::{StoreError, StoreResult},
    filters::{build_metadata, Filters, Metadata},
    models::{
        parse_id, sort_options, NewOption, NewPoll, OptionPosition, Poll, PollOption,
        ResultsVisibility,
    },
    token,
};

const POLL_WITH_OPTIONS: &str = r#"
    SELECT p.id, p.question, p.description, p.created_at, p.updated_at,
        p.expires_at, p.results_visibility, p.is_private,
        jsonb_agg(jsonb_build_object(
            'id', po.id, 'value', po.value,
            'position', po.position, 'vote_count', po.vote_count
        ) ORDER BY po.position, po.id) AS options
    FROM polls p
    JOIN poll_options po ON po.poll_id = p.id
"#;

const PUBLIC_MATCH: &str = r#"
    p.is_private = FALSE
    AND ($1 = '' OR to_tsvector('simple', p.question) @@ plainto_tsquery('simple', $1))
"#;

#[derive(sqlx::FromRow)]
struct PollRow {
    id: Uuid,
    question: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    results_visibility: ResultsVisibility,
    is_private: bool,
    options: Json<Vec<PollOption>>,
}

impl From<PollRow> for Poll {
    fn from(row: PollRow) -> Self {
        Poll {
            id: row.id,
            question: row.question,
            description: row.description,
            options: row.options.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            results_visibility: row.results_visibility,
            is_private: row.is_private,
        }
    }
}

/// Postgres-backed store. Every call is bounded by the per-operation timeout.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn timed<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn create(&self, new_poll: NewPoll) -> StoreResult<(Poll, String)> {
        let issued = token::issue();
        let poll_id = Uuid::new_v4();
        let options: Vec<PollOption> = new_poll
            .options
            .iter()
            .map(|option| PollOption {
                id: Uuid::new_v4(),
                value: option.value.clone(),
                position: option.position,
                vote_count: option.vote_count,
            })
            .collect();

        let (created_at, updated_at) = self
            .timed(async {
                // Dropping the transaction before commit rolls all three writes back.
                let mut tx = self.pool.begin().await?;

                let timestamps: (DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
                    r#"
                    INSERT INTO polls (id, question, description, expires_at, results_visibility, is_private)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING created_at, updated_at
                    "#,
                )
                .bind(poll_id)
                .bind(&new_poll.question)
                .bind(&new_poll.description)
                .bind(new_poll.expires_at)
                .bind(new_poll.results_visibility)
                .bind(new_poll.is_private)
                .fetch_one(&mut *tx)
                .await?;

                if !options.is_empty() {
                    let mut insert = QueryBuilder::<Postgres>::new(
                        "INSERT INTO poll_options (id, poll_id, value, position, vote_count) ",
                    );
                    insert.push_values(&options, |mut row, option| {
                        row.push_bind(option.id)
                            .push_bind(poll_id)
                            .push_bind(option.value.clone())
                            .push_bind(option.position)
                            .push_bind(option.vote_count);
                    });
                    insert.build().execute(&mut *tx).await?;
                }

                sqlx::query("INSERT INTO tokens (hash, poll_id) VALUES ($1, $2)")
                    .bind(&issued.hash)
                    .bind(poll_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok(timestamps)
            })
            .await?;

        debug!(poll_id = %poll_id, options = options.len(), "poll created");

        let mut options = options;
        sort_options(&mut options);

        let poll = Poll {
            id: poll_id,
            question: new_poll.question,
            description: new_poll.description,
            options,
            created_at,
            updated_at,
            expires_at: new_poll.expires_at,
            results_visibility: new_poll.results_visibility,
            is_private: new_poll.is_private,
        };

        Ok((poll, issued.plaintext))
    }

    async fn get(&self, id: &str) -> StoreResult<Poll> {
        let id = parse_id(id)?;
        let query = format!("{POLL_WITH_OPTIONS} WHERE p.id = $1 GROUP BY p.id");

        // No row back means either no poll or a poll without options.
        let row: PollRow = self
            .timed(async {
                sqlx::query_as(&query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or(StoreError::NotFound)
            })
            .await?;

        Ok(row.into())
    }

    async fn update(&self, poll: &Poll) -> StoreResult<Poll> {
        let updated_at: DateTime<Utc> = self
            .timed(async {
                sqlx::query_scalar(
                    r#"
                    UPDATE polls
                    SET question = $1, description = $2, expires_at = $3,
                        updated_at = GREATEST(NOW(), created_at)
                    WHERE id = $4
                    RETURNING updated_at
                    "#,
                )
                .bind(&poll.question)
                .bind(&poll.description)
                .bind(poll.expires_at)
                .bind(poll.id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)
            })
            .await?;

        Ok(Poll {
            updated_at,
            ..poll.clone()
        })
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = parse_id(id)?;

        let result = self
            .timed(async {
                Ok(sqlx::query("DELETE FROM polls WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        debug!(poll_id = %id, "poll deleted");
        Ok(())
    }

    async fn list(&self, search: &str, filters: &Filters) -> StoreResult<(Vec<Poll>, Metadata)> {
        let (field, direction) = filters.resolve_sort()?;

        let count_query = format!(
            "SELECT count(*) FROM polls p WHERE {PUBLIC_MATCH} \
             AND EXISTS (SELECT 1 FROM poll_options po WHERE po.poll_id = p.id)"
        );
        let page_query = format!(
            "{POLL_WITH_OPTIONS} WHERE {PUBLIC_MATCH} GROUP BY p.id \
             ORDER BY p.{} {}, p.id ASC LIMIT $2 OFFSET $3",
            field.column(),
            direction.keyword(),
        );

        let (total, rows) = self
            .timed(async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                    .execute(&mut *tx)
                    .await?;

                let total: i64 = sqlx::query_scalar(&count_query)
                    .bind(search)
                    .fetch_one(&mut *tx)
                    .await?;

                let rows: Vec<PollRow> = sqlx::query_as(&page_query)
                    .bind(search)
                    .bind(filters.limit())
                    .bind(filters.offset())
                    .fetch_all(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok((total, rows))
            })
            .await?;

        let polls = rows.into_iter().map(Poll::from).collect();
        Ok((polls, build_metadata(total, filters.page, filters.page_size)))
    }

    async fn voters_for(&self, poll_id: &str) -> StoreResult<HashSet<IpAddr>> {
        let poll_id = parse_id(poll_id)?;

        let addresses: Vec<String> = self
            .timed(async {
                Ok(sqlx::query_scalar("SELECT address FROM votes WHERE poll_id = $1")
                    .bind(poll_id)
                    .fetch_all(&self.pool)
                    .await?)
            })
            .await?;

        Ok(addresses
            .into_iter()
            .filter_map(|address| match address.parse() {
                Ok(ip) => Some(ip),
                Err(e) => {
                    warn!(poll_id = %poll_id, %address, error = %e, "unparsable voter address");
                    None
                }
            })
            .collect())
    }

    async fn lookup_by_token(&self, plaintext: &str) -> StoreResult<Uuid> {
        let hash = token::hash(plaintext);

        self.timed(async {
            sqlx::query_scalar("SELECT poll_id FROM tokens WHERE hash = $1")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }
}

#[async_trait]
impl OptionStore for PgStore {
    async fn insert_option(&self, option: NewOption, poll_id: &str) -> StoreResult<PollOption> {
        let poll_id = parse_id(poll_id)?;
        let option = PollOption {
            id: Uuid::new_v4(),
            value: option.value,
            position: option.position,
            vote_count: option.vote_count,
        };

        self.timed(async {
            let mut tx = self.pool.begin().await?;

            let touched = sqlx::query(
                "UPDATE polls SET updated_at = GREATEST(NOW(), created_at) WHERE id = $1",
            )
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
            if touched.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }

            sqlx::query(
                r#"
                INSERT INTO poll_options (id, poll_id, value, position, vote_count)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(option.id)
            .bind(poll_id)
            .bind(&option.value)
            .bind(option.position)
            .bind(option.vote_count)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await?;

        Ok(option)
    }

    async fn update_option_value(&self, option_id: &str, value: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;

        let result = self
            .timed(async {
                Ok(sqlx::query("UPDATE poll_options SET value = $1 WHERE id = $2")
                    .bind(value)
                    .bind(option_id)
                    .execute(&self.pool)
                    .await?)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_option_positions(&self, positions: &[OptionPosition]) -> StoreResult<()> {
        self.timed(async {
            let mut tx = self.pool.begin().await?;

            for target in positions {
                let result = sqlx::query("UPDATE poll_options SET position = $1 WHERE id = $2")
                    .bind(target.position)
                    .bind(target.id)
                    .execute(&mut *tx)
                    .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound);
                }
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn vote(&self, option_id: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;

        let result = self
            .timed(async {
                Ok(
                    sqlx::query("UPDATE poll_options SET vote_count = vote_count + 1 WHERE id = $1")
                        .bind(option_id)
                        .execute(&self.pool)
                        .await?,
                )
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_option(&self, option_id: &str) -> StoreResult<()> {
        let option_id = parse_id(option_id)?;

        let result = self
            .timed(async {
                Ok(sqlx::query("DELETE FROM poll_options WHERE id = $1")
                    .bind(option_id)
                    .execute(&self.pool)
                    .await?)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl VoteLedger for PgStore {
    async fn has_voted(&self, poll_id: &str, address: IpAddr) -> StoreResult<bool> {
        let poll_id = parse_id(poll_id)?;
        let address = address.to_canonical().to_string();

        self.timed(async {
            Ok(sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM votes WHERE poll_id = $1 AND address = $2)",
            )
            .bind(poll_id)
            .bind(&address)
            .fetch_one(&self.pool)
            .await?)
        })
        .await
    }

    async fn record_vote(&self, poll_id: &str, address: IpAddr) -> StoreResult<()> {
        let poll_id = parse_id(poll_id)?;
        let address = address.to_canonical().to_string();

        self.timed(async {
            sqlx::query("INSERT INTO votes (poll_id, address) VALUES ($1, $2)")
                .bind(poll_id)
                .bind(&address)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        address: IpAddr,
    ) -> StoreResult<()> {
        let poll_id = parse_id(poll_id)?;
        let option_id = parse_id(option_id)?;
        let address = address.to_canonical().to_string();

        self.timed(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query("INSERT INTO votes (poll_id, address) VALUES ($1, $2)")
                .bind(poll_id)
                .bind(&address)
                .execute(&mut *tx)
                .await?;

            let counted = sqlx::query(
                "UPDATE poll_options SET vote_count = vote_count + 1 WHERE id = $1 AND poll_id = $2",
            )
            .bind(option_id)
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
            if counted.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }

            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(poll_id = %poll_id, option_id = %option_id, "vote cast");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.timed(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
