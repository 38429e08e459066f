// Diesel table definitions for the fingerprint store. Schema matches the
// contract required of any backing store: song(id, duration, filepath,
// filehash, title, source_id) / fingerprint(id, song_id, hash, offset,
// UNIQUE(song_id, hash, offset), INDEX(hash)).

diesel::table! {
    song (id) {
        id -> Int4,
        duration -> Nullable<Float8>,
        filepath -> Nullable<Text>,
        filehash -> Nullable<Text>,
        title -> Nullable<Text>,
        source_id -> Nullable<Text>,
        created_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    fingerprint (id) {
        id -> Int8,
        song_id -> Int4,
        #[max_length = 40]
        hash -> Varchar,
        offset -> Float8,
    }
}

diesel::joinable!(fingerprint -> song (song_id));
diesel::allow_tables_to_appear_in_same_query!(fingerprint, song);
