use std::time::SystemTime;

use diesel::prelude::*;

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::store::schema::song)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SongRow {
    pub id: i32,
    pub duration: Option<f64>,
    pub filepath: Option<String>,
    pub filehash: Option<String>,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub created_at: Option<SystemTime>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::store::schema::song)]
pub struct NewSongRow {
    pub duration: Option<f64>,
    pub filepath: Option<String>,
    pub filehash: Option<String>,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub created_at: Option<SystemTime>,
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = crate::store::schema::fingerprint)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FingerprintRow {
    pub id: i64,
    pub song_id: i32,
    pub hash: String,
    pub offset: f64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::store::schema::fingerprint)]
pub struct NewFingerprintRow {
    pub song_id: i32,
    pub hash: String,
    pub offset: f64,
}

/// Flat row returned by a hash-indexed lookup join, as used by the aligner.
#[derive(QueryableByName, Debug)]
pub struct FingerprintMatchRow {
    #[diesel(sql_type = diesel::sql_types::Int4)]
    pub song_id: i32,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub hash: String,
    #[diesel(sql_type = diesel::sql_types::Float8)]
    pub offset: f64,
}
