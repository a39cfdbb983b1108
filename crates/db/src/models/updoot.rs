use chrono::{DateTime, Utc};
use diesel::{prelude::*, result::Error::NotFound};
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection, RunQueryDsl};

use crate::{schema::updoots, types::DbId};

/// One user's recorded vote on one post. At most one row per
/// `(post_id, user_id)`; `value` is always +1 or -1. "No vote" is the
/// absence of a row, never a zero.
#[derive(Queryable, Insertable, AsChangeset, Selectable, Debug, PartialEq, Clone, Eq)]
#[diesel(table_name = updoots)]
pub struct Updoot {
    pub post_id: DbId,
    pub user_id: DbId,
    pub value: i32,
    pub published: DateTime<Utc>,
}

impl Updoot {
    /// Fresh read straight from the store. The vote engine calls this
    /// inside its transaction; the batch cache is read-path only.
    pub async fn by_post_and_user(
        post_id: &DbId,
        user_id: &DbId,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        let updoot = updoots::table
            .filter(updoots::post_id.eq(post_id))
            .filter(updoots::user_id.eq(user_id))
            .first::<Self>(&mut db_pool.get().await?)
            .await;
        match updoot {
            Ok(updoot) => Ok(Some(updoot)),
            Err(NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// One batched fetch for a set of `(post_id, user_id)` keys, for the
    /// per-request vote loader. Diesel has no row-value `IN`, so this
    /// selects the superset matching both column sets in a single round
    /// trip; the loader keeps only the exact pairs it asked for.
    pub async fn by_keys(
        keys: &[(DbId, DbId)],
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Vec<Self>> {
        let post_ids: Vec<&DbId> = keys.iter().map(|(post_id, _)| post_id).collect();
        let user_ids: Vec<&DbId> = keys.iter().map(|(_, user_id)| user_id).collect();

        Ok(updoots::table
            .filter(updoots::post_id.eq_any(post_ids))
            .filter(updoots::user_id.eq_any(user_ids))
            .load::<Self>(&mut db_pool.get().await?)
            .await?)
    }
}
