//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer; the adapters translate
//! them to and from domain records.

use diesel::prelude::*;

use super::schema::{agent_state, api_queue, cache_entries, photo_queue};

/// Live mutation row as read for a snapshot.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = api_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct ApiQueueRow {
    pub seq: i64,
    pub url: String,
    pub method: String,
    pub headers: String,
    pub body: Option<String>,
    pub body_kind: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = api_queue)]
pub(crate) struct NewApiQueueRow<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub headers: String,
    pub body: Option<&'a str>,
    pub body_kind: &'a str,
    pub enqueued_at: String,
}

/// Live photo row as read for a snapshot.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = photo_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct PhotoQueueRow {
    pub seq: i64,
    pub url: String,
    pub file: Vec<u8>,
    pub name: String,
    pub content_type: String,
    pub headers: String,
    pub caption: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = photo_queue)]
pub(crate) struct NewPhotoQueueRow<'a> {
    pub url: &'a str,
    pub file: &'a [u8],
    pub name: &'a str,
    pub content_type: &'a str,
    pub headers: String,
    pub caption: Option<&'a str>,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = cache_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct CacheEntryRow {
    pub status: i32,
    pub headers: String,
    pub body: Vec<u8>,
    pub stored_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cache_entries)]
pub(crate) struct NewCacheEntryRow<'a> {
    pub namespace: &'a str,
    pub url: &'a str,
    pub status: i32,
    pub headers: String,
    pub body: &'a [u8],
    pub stored_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agent_state)]
pub(crate) struct AgentStateRow<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
