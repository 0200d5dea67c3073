//! Integration tests for the SQLite record store and day archive store

use chrono::{NaiveDate, NaiveDateTime};
use dayarchive_core::{Scope, StatementAttributes, Variant};
use dayarchive_metadata::{
    ArchiveCompletion, DayArchiveStore, DayRange, NewDayArchive, NewStatement,
    SqliteArchiveStore, StatementStore,
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

fn attributes(category: &str, ground: &str) -> StatementAttributes {
    StatementAttributes {
        category: category.to_string(),
        decision_ground: ground.to_string(),
        territorial_scope: vec!["DE".to_string(), "FR".to_string()],
        ..Default::default()
    }
}

async fn append(store: &SqliteArchiveStore, platform_id: i64, created_at: NaiveDateTime) -> i64 {
    store
        .append_statement(NewStatement {
            platform_id,
            puid: format!("puid-{}", created_at),
            created_at,
            attributes: attributes(
                "STATEMENT_CATEGORY_SCAMS_AND_FRAUD",
                "DECISION_GROUND_ILLEGAL_CONTENT",
            ),
        })
        .await
        .unwrap()
        .id
}

fn pending(date: NaiveDate, scope: Scope, slug: &str, variant: Variant) -> NewDayArchive {
    NewDayArchive {
        date,
        scope,
        variant,
        slug: slug.to_string(),
        range: DayRange::new(1, 2),
    }
}

async fn complete(store: &SqliteArchiveStore, id: i64) {
    store.update_raw(id, "raw.csv", 2).await.unwrap();
    store
        .mark_complete(
            id,
            ArchiveCompletion {
                archive_path: "raw.csv.zip".to_string(),
                checksum_path: "raw.csv.zip.sha1".to_string(),
                archive_size: 64,
                checksum: "0".repeat(40),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_platforms_listed_in_id_order() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();

    let a = store.create_platform("Alpha Market").await.unwrap();
    let b = store.create_platform("Beta Social").await.unwrap();
    assert!(a.id < b.id);
    assert_ne!(a.uuid, b.uuid);

    let platforms = store.list_platforms().await.unwrap();
    assert_eq!(platforms, vec![a, b]);
}

#[tokio::test]
async fn test_statement_roundtrip_through_range_scan() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();
    let platform = store.create_platform("Alpha Market").await.unwrap();
    let date = day(2023, 8, 8);

    let appended = store
        .append_statement(NewStatement {
            platform_id: platform.id,
            puid: "item-1".to_string(),
            created_at: at(date, 12, 30, 0),
            attributes: attributes("STATEMENT_CATEGORY_VIOLENCE", "DECISION_GROUND_INCOMPATIBLE_CONTENT"),
        })
        .await
        .unwrap();

    let fetched = store.statements_after(0, appended.id, 10).await.unwrap();
    assert_eq!(fetched, vec![appended.clone()]);
    assert_eq!(fetched[0].platform_name, "Alpha Market");
    assert_eq!(fetched[0].attributes.territorial_scope, vec!["DE", "FR"]);
}

#[tokio::test]
async fn test_statements_after_is_keyset_paginated() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();
    let platform = store.create_platform("Alpha Market").await.unwrap();
    let date = day(2023, 8, 8);

    let mut ids = Vec::new();
    for minute in 0..7 {
        ids.push(append(&store, platform.id, at(date, 10, minute, 0)).await);
    }

    let first = store.statements_after(0, ids[6], 3).await.unwrap();
    assert_eq!(first.iter().map(|s| s.id).collect::<Vec<_>>(), ids[0..3]);

    let second = store.statements_after(ids[2], ids[6], 3).await.unwrap();
    assert_eq!(second.iter().map(|s| s.id).collect::<Vec<_>>(), ids[3..6]);

    // Upper bound is inclusive and respected
    let last = store.statements_after(ids[5], ids[5], 3).await.unwrap();
    assert!(last.is_empty());
    let last = store.statements_after(ids[5], ids[6], 3).await.unwrap();
    assert_eq!(last.len(), 1);
}

#[tokio::test]
async fn test_boundary_queries() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();
    let platform = store.create_platform("Alpha Market").await.unwrap();
    let date = day(2023, 8, 8);

    let previous_day = append(&store, platform.id, at(day(2023, 8, 7), 23, 59, 59)).await;
    let first = append(&store, platform.id, at(date, 0, 0, 3)).await;
    let middle = append(&store, platform.id, at(date, 13, 0, 0)).await;
    let last = append(&store, platform.id, at(date, 23, 59, 55)).await;

    let start_marks: Vec<_> = (0..10).map(|s| at(date, 0, 0, s)).collect();
    let end_marks: Vec<_> = (50..60).map(|s| at(date, 23, 59, s)).collect();

    assert_eq!(store.min_id_at(&start_marks).await.unwrap(), Some(first));
    assert_eq!(store.max_id_at(&end_marks).await.unwrap(), Some(last));
    assert_eq!(store.min_id_at(&[]).await.unwrap(), None);

    let from = at(date, 0, 0, 0);
    let to = at(date, 23, 59, 59);
    assert_eq!(store.min_id_between(from, to).await.unwrap(), Some(first));
    assert_eq!(store.max_id_between(from, to).await.unwrap(), Some(last));
    assert!(previous_day < first && first < middle && middle < last);

    let empty = day(2023, 8, 9);
    assert_eq!(
        store
            .min_id_between(at(empty, 0, 0, 0), at(empty, 23, 59, 59))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_global_list_newest_first_and_only_completed() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();

    for d in [day(2023, 8, 6), day(2023, 8, 7), day(2023, 8, 8)] {
        let created = store
            .claim_day(
                d,
                vec![
                    pending(d, Scope::Global, "global", Variant::Full),
                    pending(d, Scope::Global, "global", Variant::Light),
                ],
            )
            .await
            .unwrap();
        // The middle day stays incomplete
        if d != day(2023, 8, 7) {
            for archive in created {
                complete(&store, archive.id).await;
            }
        }
    }

    let listed = store.global_list().await.unwrap();
    let dates: Vec<_> = listed.iter().map(|a| a.date).collect();
    assert_eq!(
        dates,
        vec![day(2023, 8, 8), day(2023, 8, 8), day(2023, 8, 6), day(2023, 8, 6)]
    );
    assert!(listed.iter().all(|a| a.is_usable()));
}

#[tokio::test]
async fn test_list_by_slug_and_by_date() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();
    let platform = store.create_platform("Alpha Market").await.unwrap();
    let date = day(2023, 8, 8);

    let created = store
        .claim_day(
            date,
            vec![
                pending(date, Scope::Global, "global", Variant::Full),
                pending(date, Scope::Global, "global", Variant::Light),
                pending(
                    date,
                    Scope::Platform {
                        id: platform.id,
                        name: platform.name.clone(),
                    },
                    "alpha-market",
                    Variant::Full,
                ),
            ],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 3);

    // Not complete yet: hidden from slug listings but visible by date
    assert!(store.list_by_slug("alpha-market").await.unwrap().is_empty());
    let by_date = store.get_day_archive_by_date(date).await.unwrap().unwrap();
    assert_eq!(by_date.scope, Scope::Global);
    assert_eq!(by_date.variant, Variant::Full);
    assert!(!by_date.is_usable());

    complete(&store, created[2].id).await;
    let listed = store.list_by_slug("alpha-market").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].scope.platform_id(), Some(platform.id));

    let all = store.list_for_date(date).await.unwrap();
    assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), created.iter().map(|a| a.id).collect::<Vec<_>>());

    assert!(store.get_day_archive_by_date(day(2023, 8, 9)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_backed_store_persists_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("archive.db");
    let date = day(2023, 8, 8);

    {
        let store = SqliteArchiveStore::new(&path).await.unwrap();
        store
            .claim_day(date, vec![pending(date, Scope::Global, "global", Variant::Full)])
            .await
            .unwrap();
    }

    let store = SqliteArchiveStore::new(&path).await.unwrap();
    assert!(store.is_day_claimed(date).await.unwrap());
    assert_eq!(store.list_for_date(date).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_racing_claims_across_connections_have_one_winner() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("archive.db");
    let first = SqliteArchiveStore::new(&path).await.unwrap();
    let second = SqliteArchiveStore::new(&path).await.unwrap();

    let rows = |date: NaiveDate| -> Vec<NewDayArchive> {
        (0..40)
            .map(|n| {
                let variant = if n % 2 == 0 { Variant::Full } else { Variant::Light };
                pending(date, Scope::Global, &format!("scope-{}", n / 2), variant)
            })
            .collect()
    };

    for d in 1..=10 {
        let date = day(2023, 8, d);
        let (a, b) = tokio::join!(
            first.claim_day(date, rows(date)),
            second.claim_day(date, rows(date)),
        );

        let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1, "day {}", date);
        let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
        assert!(
            matches!(loser, dayarchive_metadata::MetadataError::DayAlreadyArchived(claimed) if claimed == date),
            "unexpected error for {}: {}",
            date,
            loser
        );
        assert_eq!(first.list_for_date(date).await.unwrap().len(), 40);
    }
}

#[tokio::test]
async fn test_failed_claim_leaves_connection_usable() {
    let store = SqliteArchiveStore::new_in_memory().await.unwrap();
    let date = day(2023, 8, 8);

    store
        .claim_day(date, vec![pending(date, Scope::Global, "global", Variant::Full)])
        .await
        .unwrap();
    let err = store
        .claim_day(date, vec![pending(date, Scope::Global, "global", Variant::Light)])
        .await
        .unwrap_err();
    assert!(matches!(err, dayarchive_metadata::MetadataError::DayAlreadyArchived(_)));

    // The single in-memory connection was rolled back, not left mid-transaction
    let other = day(2023, 8, 9);
    store
        .claim_day(other, vec![pending(other, Scope::Global, "global", Variant::Full)])
        .await
        .unwrap();
    assert_eq!(store.list_for_date(date).await.unwrap().len(), 1);
    assert_eq!(store.list_for_date(other).await.unwrap().len(), 1);
}
