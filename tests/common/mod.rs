// Scenarios shared by the memory and Postgres store tests.
#![allow(dead_code)]

use std::{net::IpAddr, sync::Arc, time::Duration};

use chrono::Utc;
use uuid::Uuid;

use polls::{
    error::StoreError,
    filters::Filters,
    models::{NewOption, NewPoll, OptionPosition, Poll},
    store::Store,
};

pub fn ip(raw: &str) -> IpAddr {
    raw.parse().unwrap()
}

pub fn new_poll(question: &str, options: &[&str]) -> NewPoll {
    NewPoll {
        question: question.to_string(),
        options: options
            .iter()
            .enumerate()
            .map(|(i, value)| NewOption::new(*value, i as i32))
            .collect(),
        ..NewPoll::default()
    }
}

async fn create(store: &dyn Store, question: &str) -> (Poll, String) {
    store
        .create(new_poll(question, &["One", "Two", "Three"]))
        .await
        .expect("create poll")
}

fn vote_count(poll: &Poll, option_id: Uuid) -> i64 {
    poll.option(option_id).expect("option present").vote_count
}

pub async fn create_then_get(store: Arc<dyn Store>) {
    let mut input = new_poll("Test?", &["One", "Two", "Three"]);
    input.description = Some("A description".into());
    // Caller order differs from position order.
    input.options[0].position = 5;

    let (created, token) = store.create(input).await.unwrap();
    assert!(!token.is_empty());
    assert!(!created.id.is_nil());
    assert!(created.updated_at >= created.created_at);
    assert_eq!(created.options.len(), 3);
    assert!(created.options.iter().all(|option| !option.id.is_nil()));
    assert!(created.options.iter().all(|option| option.vote_count == 0));

    let fetched = store.get(&created.id.to_string()).await.unwrap();
    assert_eq!(fetched.question, "Test?");
    assert_eq!(fetched.description.as_deref(), Some("A description"));
    assert_eq!(fetched.options.len(), 3);

    let values: Vec<_> = fetched.options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, ["Two", "Three", "One"]);
}

pub async fn get_unknown_is_not_found(store: Arc<dyn Store>) {
    for id in [String::new(), "test".into(), "1".into(), Uuid::new_v4().to_string()] {
        assert!(
            matches!(store.get(&id).await, Err(StoreError::NotFound)),
            "{id:?} should be not found"
        );
    }
}

pub async fn update_poll(store: Arc<dyn Store>) {
    let (mut poll, _) = create(store.as_ref(), "Is this a test?").await;
    let old_updated_at = poll.updated_at;

    tokio::time::sleep(Duration::from_millis(10)).await;

    poll.question = "Is this still a test?".into();
    poll.description = Some("Test description.".into());
    poll.expires_at = Some(Utc::now() + chrono::Duration::minutes(10));

    let updated = store.update(&poll).await.unwrap();
    assert!(updated.updated_at > old_updated_at);

    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(fetched.question, "Is this still a test?");
    assert_eq!(fetched.description.as_deref(), Some("Test description."));
    assert!(fetched.expires_at.is_some());
    assert_eq!(fetched.created_at, poll.created_at);
    assert!(fetched.updated_at > old_updated_at);

    let missing = Poll {
        id: Uuid::new_v4(),
        ..poll
    };
    assert!(matches!(store.update(&missing).await, Err(StoreError::NotFound)));
}

pub async fn insert_option_touches_poll(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Options?").await;
    let id = poll.id.to_string();

    tokio::time::sleep(Duration::from_millis(10)).await;

    let option = store.insert_option(NewOption::new("Four", 3), &id).await.unwrap();
    assert!(!option.id.is_nil());
    assert_eq!(option.vote_count, 0);

    let fetched = store.get(&id).await.unwrap();
    assert_eq!(fetched.options.len(), 4);
    assert!(fetched.options.iter().any(|o| o.value == "Four"));
    assert!(fetched.updated_at > poll.updated_at);

    let err = store
        .insert_option(NewOption::new("Orphan", 0), &Uuid::new_v4().to_string())
        .await;
    assert!(matches!(err, Err(StoreError::NotFound)));
}

pub async fn update_option_value(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Rename?").await;
    let option_id = poll.options[0].id;

    store
        .update_option_value(&option_id.to_string(), "Test change value")
        .await
        .unwrap();

    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(fetched.option(option_id).unwrap().value, "Test change value");

    let err = store.update_option_value(&Uuid::new_v4().to_string(), "x").await;
    assert!(matches!(err, Err(StoreError::NotFound)));
}

pub async fn update_option_positions(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Reorder?").await;
    let [one, two, three] = [poll.options[0].id, poll.options[1].id, poll.options[2].id];

    store
        .update_option_positions(&[
            OptionPosition { id: three, position: 0 },
            OptionPosition { id: one, position: 2 },
        ])
        .await
        .unwrap();

    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    let order: Vec<_> = fetched.options.iter().map(|o| o.id).collect();
    assert_eq!(order, [three, two, one]);

    // One unknown id rejects the whole batch.
    let err = store
        .update_option_positions(&[
            OptionPosition { id: one, position: 99 },
            OptionPosition { id: Uuid::new_v4(), position: 1 },
        ])
        .await;
    assert!(matches!(err, Err(StoreError::NotFound)));

    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(fetched.option(one).unwrap().position, 2);
}

pub async fn vote_increments(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Vote?").await;
    let option_id = poll.options[0].id;

    store.vote(&option_id.to_string()).await.unwrap();
    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(vote_count(&fetched, option_id), 1);

    store.vote(&option_id.to_string()).await.unwrap();
    store.vote(&option_id.to_string()).await.unwrap();
    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(vote_count(&fetched, option_id), 3);
    assert_eq!(vote_count(&fetched, poll.options[1].id), 0);

    for bad in [String::new(), "99".into(), Uuid::new_v4().to_string()] {
        assert!(matches!(store.vote(&bad).await, Err(StoreError::NotFound)));
    }
}

pub async fn concurrent_votes_are_not_lost(store: Arc<dyn Store>) {
    for voters in [1usize, 3, 50] {
        let (poll, _) = create(store.as_ref(), "Concurrent?").await;
        let option_id = poll.options[1].id.to_string();

        let tasks: Vec<_> = (0..voters)
            .map(|_| {
                let store = Arc::clone(&store);
                let option_id = option_id.clone();
                tokio::spawn(async move { store.vote(&option_id).await })
            })
            .collect();

        for task in tasks {
            task.await.expect("vote task").expect("vote");
        }

        let fetched = store.get(&poll.id.to_string()).await.unwrap();
        assert_eq!(vote_count(&fetched, poll.options[1].id), voters as i64);
    }
}

pub async fn delete_option(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Trim?").await;
    let removed = poll.options[2].id;

    store.delete_option(&removed.to_string()).await.unwrap();

    let fetched = store.get(&poll.id.to_string()).await.unwrap();
    assert_eq!(fetched.options.len(), 2);
    assert!(fetched.option(removed).is_none());
    // Siblings keep their positions.
    assert_eq!(fetched.options[0].position, 0);
    assert_eq!(fetched.options[1].position, 1);

    let err = store.delete_option(&removed.to_string()).await;
    assert!(matches!(err, Err(StoreError::NotFound)));
}

pub async fn poll_without_options_is_absent(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Empty?").await;
    for option in &poll.options {
        store.delete_option(&option.id.to_string()).await.unwrap();
    }

    assert!(matches!(
        store.get(&poll.id.to_string()).await,
        Err(StoreError::NotFound)
    ));
}

pub async fn vote_ledger(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Ledger?").await;
    let id = poll.id.to_string();

    assert!(!store.has_voted(&id, ip("10.0.0.1")).await.unwrap());

    store.record_vote(&id, ip("10.0.0.1")).await.unwrap();
    assert!(matches!(
        store.record_vote(&id, ip("10.0.0.1")).await,
        Err(StoreError::Conflict)
    ));
    store.record_vote(&id, ip("10.0.0.2")).await.unwrap();

    assert!(store.has_voted(&id, ip("10.0.0.1")).await.unwrap());
    // IPv4-mapped IPv6 is the same voter.
    assert!(store.has_voted(&id, ip("::ffff:10.0.0.2")).await.unwrap());
    assert!(!store.has_voted(&id, ip("10.0.0.3")).await.unwrap());

    let voters = store.voters_for(&id).await.unwrap();
    assert_eq!(voters.len(), 2);
    assert!(voters.contains(&ip("10.0.0.1")));
    assert!(voters.contains(&ip("10.0.0.2")));

    let err = store.record_vote(&Uuid::new_v4().to_string(), ip("10.0.0.1")).await;
    assert!(matches!(err, Err(StoreError::NotFound)));
}

pub async fn cast_vote(store: Arc<dyn Store>) {
    let (poll, _) = create(store.as_ref(), "Cast?").await;
    let (other, _) = create(store.as_ref(), "Other?").await;
    let id = poll.id.to_string();
    let option_id = poll.options[0].id.to_string();

    store.cast_vote(&id, &option_id, ip("192.168.1.1")).await.unwrap();
    assert!(store.has_voted(&id, ip("192.168.1.1")).await.unwrap());

    assert!(matches!(
        store.cast_vote(&id, &option_id, ip("192.168.1.1")).await,
        Err(StoreError::Conflict)
    ));

    // An option of another poll is not found and leaves nothing behind.
    let foreign = other.options[0].id.to_string();
    assert!(matches!(
        store.cast_vote(&id, &foreign, ip("192.168.1.2")).await,
        Err(StoreError::NotFound)
    ));
    assert!(!store.has_voted(&id, ip("192.168.1.2")).await.unwrap());

    let fetched = store.get(&id).await.unwrap();
    assert_eq!(vote_count(&fetched, poll.options[0].id), 1);
    let fetched_other = store.get(&other.id.to_string()).await.unwrap();
    assert_eq!(vote_count(&fetched_other, other.options[0].id), 0);
}

pub async fn lookup_by_token(store: Arc<dyn Store>) {
    let (poll, token) = create(store.as_ref(), "Token?").await;
    let (_, other_token) = create(store.as_ref(), "Other token?").await;

    assert_eq!(store.lookup_by_token(&token).await.unwrap(), poll.id);
    assert_ne!(store.lookup_by_token(&other_token).await.unwrap(), poll.id);

    let wrong = format!("{token}x");
    assert!(matches!(store.lookup_by_token(&wrong).await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.lookup_by_token("nonexistent").await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(store.lookup_by_token("").await, Err(StoreError::NotFound)));
}

pub async fn delete_cascades(store: Arc<dyn Store>) {
    let (poll, token) = create(store.as_ref(), "Delete?").await;
    let id = poll.id.to_string();
    store
        .cast_vote(&id, &poll.options[0].id.to_string(), ip("172.16.0.1"))
        .await
        .unwrap();

    store.delete(&id).await.unwrap();

    assert!(matches!(store.get(&id).await, Err(StoreError::NotFound)));
    assert!(!store.has_voted(&id, ip("172.16.0.1")).await.unwrap());
    assert!(store.voters_for(&id).await.unwrap().is_empty());
    assert!(matches!(store.lookup_by_token(&token).await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.vote(&poll.options[0].id.to_string()).await,
        Err(StoreError::NotFound)
    ));

    for bad in [id.clone(), String::new(), "0".into()] {
        assert!(matches!(store.delete(&bad).await, Err(StoreError::NotFound)));
    }
}

/// Expects a store holding no other polls.
pub async fn list_polls(store: Arc<dyn Store>) {
    for i in 0..10u8 {
        let letter = (b'a' + i) as char;
        let question = format!("{letter} question");
        let options: Vec<String> = ["one", "two", "three"]
            .iter()
            .map(|n| format!("Option {n}, poll {letter}"))
            .collect();
        let options: Vec<&str> = options.iter().map(String::as_str).collect();

        store.create(new_poll(&question, &options)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut private = new_poll("k question", &["yes", "no"]);
    private.is_private = true;
    store.create(private).await.unwrap();

    struct Case {
        name: &'static str,
        search: &'static str,
        page: i64,
        page_size: i64,
        sort: &'static str,
        records: usize,
        total: i64,
        last_page: i64,
        first: Option<&'static str>,
    }

    let cases = [
        Case { name: "default settings", search: "", page: 1, page_size: 20, sort: "-created_at", records: 10, total: 10, last_page: 1, first: Some("j question") },
        Case { name: "page size", search: "", page: 1, page_size: 2, sort: "-created_at", records: 2, total: 10, last_page: 5, first: Some("j question") },
        Case { name: "page", search: "", page: 2, page_size: 5, sort: "-created_at", records: 5, total: 10, last_page: 2, first: Some("e question") },
        Case { name: "sort by question asc", search: "", page: 1, page_size: 20, sort: "question", records: 10, total: 10, last_page: 1, first: Some("a question") },
        Case { name: "sort by question desc", search: "", page: 1, page_size: 20, sort: "-question", records: 10, total: 10, last_page: 1, first: Some("j question") },
        Case { name: "sort by created asc", search: "", page: 1, page_size: 20, sort: "created_at", records: 10, total: 10, last_page: 1, first: Some("a question") },
        Case { name: "search", search: "d", page: 1, page_size: 20, sort: "-created_at", records: 1, total: 1, last_page: 1, first: Some("d question") },
        Case { name: "search every poll", search: "Question", page: 1, page_size: 20, sort: "question", records: 10, total: 10, last_page: 1, first: Some("a question") },
        Case { name: "private poll excluded", search: "k", page: 1, page_size: 20, sort: "-created_at", records: 0, total: 0, last_page: 0, first: None },
        Case { name: "no matches", search: "test", page: 1, page_size: 20, sort: "-created_at", records: 0, total: 0, last_page: 0, first: None },
        Case { name: "page value too high", search: "", page: 42, page_size: 20, sort: "-created_at", records: 0, total: 10, last_page: 1, first: None },
    ];

    for case in cases {
        let filters = Filters::new(case.page, case.page_size, case.sort);
        let (polls, metadata) = store.list(case.search, &filters).await.unwrap();

        assert_eq!(polls.len(), case.records, "{}: records", case.name);
        assert_eq!(metadata.total_records, case.total, "{}: total", case.name);
        assert_eq!(metadata.last_page, case.last_page, "{}: last page", case.name);
        assert!(polls.iter().all(|poll| !poll.is_private), "{}: private", case.name);

        if let Some(first) = case.first {
            assert_eq!(polls[0].question, first, "{}: first poll", case.name);
            let letter = &first[..1];
            assert_eq!(polls[0].options.len(), 3, "{}: options", case.name);
            assert_eq!(
                polls[0].options[0].value,
                format!("Option one, poll {letter}"),
                "{}: option order",
                case.name
            );
        }
    }

    let err = store.list("", &Filters::new(1, 20, "bogus")).await;
    assert!(matches!(err, Err(StoreError::InvalidSortField(_))));
}

async fn public_total(store: &dyn Store) -> i64 {
    let (_, metadata) = store
        .list("", &Filters::new(1, 20, "-created_at"))
        .await
        .expect("list polls");
    metadata.total_records
}

/// A create whose option rows break a constraint leaves no poll behind.
pub async fn failed_create_leaves_nothing(store: Arc<dyn Store>) {
    let before = public_total(&*store).await;

    let mut input = new_poll("Rolled back?", &["One", "Two"]);
    input.options[1].vote_count = -1;
    let err = store.create(input).await.unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");

    let err = store.create(new_poll("", &["One", "Two"])).await.unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");

    assert_eq!(public_total(&*store).await, before);
    let (polls, _) = store.list("Rolled", &Filters::new(1, 20, "-created_at")).await.unwrap();
    assert!(polls.is_empty());
}

pub async fn constraints_hold_after_create(store: Arc<dyn Store>) {
    let (poll, _) = create(&*store, "Constrained?").await;
    let id = poll.id.to_string();

    let err = store
        .update(&Poll { question: String::new(), ..poll.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");

    let negative = NewOption { vote_count: -5, ..NewOption::new("Four", 3) };
    let err = store.insert_option(negative, &id).await.unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");

    let fetched = store.get(&id).await.unwrap();
    assert_eq!(fetched.question, "Constrained?");
    assert_eq!(fetched.options.len(), 3);
    assert!(fetched.options.iter().all(|option| option.vote_count == 0));
}
