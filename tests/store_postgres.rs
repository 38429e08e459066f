//! Store-invariant coverage for the C6 operations that have no `SongStore`
//! trait double to stand in for them (`query_songs`, `delete_all`): spec.md
//! section 8.8 ("inserting N fingerprints for a song exposes exactly N rows
//! linked to that song; deleting removes all of them") and section 4.6's
//! filter contract.
//!
//! These need a real Postgres reachable at `DATABASE_URL` with the
//! `song`/`fingerprint` tables from migrations applied, so they're
//! `#[ignore]`d by default. Run explicitly against a disposable test
//! database with:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/sabi_test cargo test --test store_postgres -- --ignored --test-threads=1
//! ```
//!
//! `--test-threads=1` matters: each test calls `delete_all()` to start from
//! a clean slate, which would race with a concurrently-running test.

use sabi::engine::Fingerprint;
use sabi::store::{DurationFilter, FingerprintStore, SongDescriptor, SongFilter};

fn test_store() -> FingerprintStore {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run the ignored Postgres-backed store tests");
    FingerprintStore::new(&database_url).expect("failed to connect to DATABASE_URL")
}

#[test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
fn insert_then_lookup_round_trip_matches_inserted_count() {
    let store = test_store();
    store.delete_all().unwrap();

    let song_id = store
        .insert_song(&SongDescriptor {
            duration: Some(12.5),
            filepath: Some("/tmp/round-trip.wav".into()),
            filehash: Some("f00dcafe".into()),
            title: Some("round trip song".into()),
            source_id: None,
        })
        .unwrap();

    let fingerprints: Vec<Fingerprint> = (0..50)
        .map(|i| Fingerprint {
            hash: format!("{i:08x}"),
            offset: i as f32 * 0.1,
        })
        .collect();
    let inserted = store.insert_fingerprints(song_id, &fingerprints).unwrap();
    assert_eq!(inserted, fingerprints.len());

    let fetched = store.get_song(song_id, true).unwrap().expect("song should exist");
    assert_eq!(fetched.fingerprints.as_ref().unwrap().len(), fingerprints.len());
}

#[test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
fn query_songs_filters_by_title_and_duration() {
    let store = test_store();
    store.delete_all().unwrap();

    let short_id = store
        .insert_song(&SongDescriptor {
            duration: Some(10.0),
            filepath: None,
            filehash: Some("short-hash".into()),
            title: Some("query-test-short".into()),
            source_id: None,
        })
        .unwrap();
    let long_id = store
        .insert_song(&SongDescriptor {
            duration: Some(20.0),
            filepath: None,
            filehash: Some("long-hash".into()),
            title: Some("query-test-long".into()),
            source_id: None,
        })
        .unwrap();

    let by_title = store
        .query_songs(&SongFilter {
            titles: Some(vec!["query-test-short".into()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0].id, short_id);

    let by_duration = store
        .query_songs(&SongFilter {
            duration: Some(DurationFilter::GreaterThan(15.0)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_duration.len(), 1);
    assert_eq!(by_duration[0].id, long_id);

    let empty_filter_err = store.query_songs(&SongFilter::default());
    assert!(empty_filter_err.is_err());
}

#[test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
fn delete_all_removes_songs_and_their_fingerprints() {
    let store = test_store();
    store.delete_all().unwrap();

    let song_id = store
        .insert_song(&SongDescriptor {
            duration: Some(5.0),
            filepath: None,
            filehash: Some("to-be-deleted".into()),
            title: Some("ephemeral".into()),
            source_id: None,
        })
        .unwrap();
    store
        .insert_fingerprints(
            song_id,
            &[
                Fingerprint { hash: "aaaa".into(), offset: 0.0 },
                Fingerprint { hash: "bbbb".into(), offset: 1.0 },
            ],
        )
        .unwrap();
    assert!(store.get_song(song_id, false).unwrap().is_some());

    store.delete_all().unwrap();

    assert!(store.get_song(song_id, false).unwrap().is_none());
    let remaining = store
        .query_songs(&SongFilter {
            ids: Some(vec![song_id]),
            ..Default::default()
        })
        .unwrap();
    assert!(remaining.is_empty());
}
