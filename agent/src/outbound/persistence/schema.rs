//! Diesel table definitions for the SQLite store.
//!
//! These definitions must match `migrations/` exactly. Timestamps are stored
//! as RFC 3339 text and header maps as JSON text.

diesel::table! {
    /// Queued mutations, oldest first by `seq`.
    api_queue (seq) {
        seq -> BigInt,
        url -> Text,
        method -> Text,
        /// Lower-cased header map as a JSON object.
        headers -> Text,
        body -> Nullable<Text>,
        /// `text` or `multipart`.
        body_kind -> Text,
        enqueued_at -> Text,
        failed_attempts -> Integer,
        abandoned_at -> Nullable<Text>,
    }
}

diesel::table! {
    /// Queued photo uploads.
    photo_queue (seq) {
        seq -> BigInt,
        url -> Text,
        file -> Binary,
        name -> Text,
        content_type -> Text,
        headers -> Text,
        caption -> Nullable<Text>,
        created_at -> Text,
        failed_attempts -> Integer,
        abandoned_at -> Nullable<Text>,
    }
}

diesel::table! {
    /// Cached responses keyed by namespace and full URL.
    cache_entries (namespace, url) {
        namespace -> Text,
        url -> Text,
        status -> Integer,
        /// Header pairs as a JSON array.
        headers -> Text,
        body -> Binary,
        stored_at -> Text,
    }
}

diesel::table! {
    /// Small key/value facts, such as the active version.
    agent_state (key) {
        key -> Text,
        value -> Text,
    }
}
