//! C6: persists songs and their fingerprints; supports bulk insert and
//! hash-indexed lookup.

pub mod models;
pub mod schema;

use std::collections::HashSet;
use std::time::SystemTime;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::upsert::on_constraint;

use crate::engine::Fingerprint;
use crate::error::{Result, SabiError};
use models::{FingerprintMatchRow, NewFingerprintRow, NewSongRow};

const FINGERPRINT_BATCH_SIZE: usize = 15_000;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PooledPgConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Fields describing a song to be inserted or used as a query filter.
/// Any field may be absent.
#[derive(Debug, Clone, Default)]
pub struct SongDescriptor {
    pub duration: Option<f32>,
    pub filepath: Option<String>,
    pub filehash: Option<String>,
    pub title: Option<String>,
    pub source_id: Option<String>,
}

/// A song fetched from the store.
#[derive(Debug, Clone)]
pub struct StoredSong {
    pub id: i32,
    pub duration: Option<f32>,
    pub filepath: Option<String>,
    pub filehash: Option<String>,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub fingerprints: Option<Vec<Fingerprint>>,
}

#[derive(Debug, Clone, Copy)]
pub enum DurationFilter {
    Equal(f32),
    GreaterThan(f32),
    LessThan(f32),
}

/// At most one of the optional fields' comparators may combine with
/// `duration` in a single call; `duration` itself only ever carries one
/// comparator variant by construction.
#[derive(Debug, Clone, Default)]
pub struct SongFilter {
    pub ids: Option<Vec<i32>>,
    pub filehashes: Option<Vec<String>>,
    pub titles: Option<Vec<String>>,
    pub source_ids: Option<Vec<String>>,
    pub duration: Option<DurationFilter>,
}

impl SongFilter {
    fn is_empty(&self) -> bool {
        self.ids.is_none()
            && self.filehashes.is_none()
            && self.titles.is_none()
            && self.source_ids.is_none()
            && self.duration.is_none()
    }
}

/// The store operations the pipeline's terminal worker needs. Lets tests
/// substitute an in-memory double for a real Postgres-backed
/// [`FingerprintStore`] without touching the pipeline's concurrency code.
pub trait SongStore: Send + Sync {
    fn insert_song(&self, desc: &SongDescriptor) -> Result<i32>;
    fn insert_fingerprints(&self, song_id: i32, fingerprints: &[Fingerprint]) -> Result<usize>;
    fn lookup(&self, hashes: &HashSet<String>) -> Result<Vec<(i32, String, f32)>>;
}

/// A connection-pooled handle onto the fingerprint store. Each CPU worker
/// in the pipeline clones this (cheaply, it's a pool handle) and pulls its
/// own connection per operation.
#[derive(Clone)]
pub struct FingerprintStore {
    pool: PgPool,
}

impl SongStore for FingerprintStore {
    fn insert_song(&self, desc: &SongDescriptor) -> Result<i32> {
        FingerprintStore::insert_song(self, desc)
    }

    fn insert_fingerprints(&self, song_id: i32, fingerprints: &[Fingerprint]) -> Result<usize> {
        FingerprintStore::insert_fingerprints(self, song_id, fingerprints)
    }

    fn lookup(&self, hashes: &HashSet<String>) -> Result<Vec<(i32, String, f32)>> {
        FingerprintStore::lookup(self, hashes)
    }
}

impl FingerprintStore {
    pub fn new(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| SabiError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledPgConnection> {
        Ok(self.pool.get()?)
    }

    pub fn insert_song(&self, desc: &SongDescriptor) -> Result<i32> {
        use schema::song::dsl::*;

        let new_row = NewSongRow {
            duration: desc.duration.map(|d| d as f64),
            filepath: desc.filepath.clone(),
            filehash: desc.filehash.clone(),
            title: desc.title.clone(),
            source_id: desc.source_id.clone(),
            created_at: Some(SystemTime::now()),
        };

        let mut conn = self.conn()?;
        let inserted_id: i32 = diesel::insert_into(song)
            .values(&new_row)
            .returning(id)
            .get_result(&mut conn)?;
        Ok(inserted_id)
    }

    pub fn insert_fingerprints(&self, song_id_value: i32, fingerprints: &[Fingerprint]) -> Result<usize> {
        use schema::fingerprint::dsl::*;

        if fingerprints.is_empty() {
            return Ok(0);
        }

        let rows: Vec<NewFingerprintRow> = fingerprints
            .iter()
            .map(|fp| NewFingerprintRow {
                song_id: song_id_value,
                hash: fp.hash.clone(),
                offset: fp.offset as f64,
            })
            .collect();

        let mut conn = self.conn()?;
        let total: usize = conn.transaction(|conn| {
            let mut inserted = 0usize;
            for batch in rows.chunks(FINGERPRINT_BATCH_SIZE) {
                inserted += diesel::insert_into(fingerprint)
                    .values(batch)
                    .on_conflict(on_constraint("fingerprint_song_id_hash_offset_key"))
                    .do_nothing()
                    .execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(inserted)
        })?;

        Ok(total)
    }

    /// Return every stored fingerprint whose hash is in `hashes`, via an
    /// indexed equality join against a temporary table (keeps a
    /// potentially tens-of-thousands-long `IN` list out of the query
    /// planner's literal list).
    pub fn lookup(&self, hashes: &HashSet<String>) -> Result<Vec<(i32, String, f32)>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let hashes: Vec<String> = hashes.iter().cloned().collect();
        let mut conn = self.conn()?;

        let rows: Vec<FingerprintMatchRow> = conn.transaction(|conn| {
            diesel::sql_query(
                "CREATE TEMPORARY TABLE lookup_hashes (hash VARCHAR(40) NOT NULL PRIMARY KEY) ON COMMIT DROP",
            )
            .execute(conn)?;

            diesel::table! {
                lookup_hashes (hash) {
                    #[max_length = 40]
                    hash -> Varchar,
                }
            }

            #[derive(Insertable)]
            #[diesel(table_name = lookup_hashes)]
            struct NewLookupHash {
                hash: String,
            }

            const BATCH_SIZE: usize = 5000;
            for batch in hashes.chunks(BATCH_SIZE) {
                let values: Vec<NewLookupHash> = batch
                    .iter()
                    .map(|h| NewLookupHash { hash: h.clone() })
                    .collect();
                diesel::insert_into(lookup_hashes::table)
                    .values(&values)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
            }

            diesel::sql_query(
                "SELECT f.song_id, f.hash, f.offset FROM fingerprint AS f \
                 INNER JOIN lookup_hashes AS t ON f.hash = t.hash",
            )
            .load(conn)
        })?;

        Ok(rows
            .into_iter()
            .map(|r| (r.song_id, r.hash, r.offset as f32))
            .collect())
    }

    pub fn get_song(&self, song_id_value: i32, with_fingerprints: bool) -> Result<Option<StoredSong>> {
        use schema::song::dsl::*;

        let mut conn = self.conn()?;
        let row: Option<models::SongRow> = song
            .filter(id.eq(song_id_value))
            .select(models::SongRow::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let fps = if with_fingerprints {
            Some(self.fingerprints_for_song(&mut conn, song_id_value)?)
        } else {
            None
        };

        Ok(Some(to_stored_song(row, fps)))
    }

    fn fingerprints_for_song(
        &self,
        conn: &mut PgConnection,
        song_id_value: i32,
    ) -> Result<Vec<Fingerprint>> {
        use schema::fingerprint::dsl::*;

        let rows: Vec<models::FingerprintRow> = fingerprint
            .filter(song_id.eq(song_id_value))
            .select(models::FingerprintRow::as_select())
            .load(conn)?;

        Ok(rows
            .into_iter()
            .map(|r| Fingerprint {
                hash: r.hash,
                offset: r.offset as f32,
            })
            .collect())
    }

    pub fn query_songs(&self, filter: &SongFilter) -> Result<Vec<StoredSong>> {
        use schema::song::dsl::*;

        if filter.is_empty() {
            return Err(SabiError::InvalidFilter(
                "query_songs requires at least one filter".into(),
            ));
        }

        let mut query = song.into_boxed::<diesel::pg::Pg>();

        if let Some(ref ids) = filter.ids {
            query = query.filter(id.eq_any(ids.clone()));
        }
        if let Some(ref hashes) = filter.filehashes {
            query = query.filter(filehash.eq_any(hashes.clone()));
        }
        if let Some(ref titles) = filter.titles {
            query = query.filter(title.eq_any(titles.clone()));
        }
        if let Some(ref source_ids) = filter.source_ids {
            query = query.filter(source_id.eq_any(source_ids.clone()));
        }
        match filter.duration {
            Some(DurationFilter::Equal(d)) => {
                query = query.filter(duration.eq(d as f64));
            }
            Some(DurationFilter::GreaterThan(d)) => {
                query = query.filter(duration.gt(d as f64));
            }
            Some(DurationFilter::LessThan(d)) => {
                query = query.filter(duration.lt(d as f64));
            }
            None => {}
        }

        let mut conn = self.conn()?;
        let rows: Vec<models::SongRow> = query.select(models::SongRow::as_select()).load(&mut conn)?;

        Ok(rows.into_iter().map(|r| to_stored_song(r, None)).collect())
    }

    pub fn delete_all(&self) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            diesel::delete(schema::fingerprint::table).execute(conn)?;
            diesel::delete(schema::song::table).execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })?;
        Ok(())
    }
}

fn to_stored_song(row: models::SongRow, fingerprints: Option<Vec<Fingerprint>>) -> StoredSong {
    StoredSong {
        id: row.id,
        duration: row.duration.map(|d| d as f32),
        filepath: row.filepath,
        filehash: row.filehash,
        title: row.title,
        source_id: row.source_id,
        fingerprints,
    }
}
