//! The vote transition engine.
//!
//! A vote request lands here with an authenticated user, a post id and a
//! direction. The engine reads the user's current vote row straight from
//! the store (never through the per-request cache, which may hold state
//! from before an earlier mutation), decides what has to change, and
//! applies the vote row write and the `posts.points` delta inside one
//! transaction. A vote that is recorded without moving the score (or the
//! other way round) is the one failure mode this module exists to rule
//! out.

use chrono::Utc;
use db::{
    models::Updoot,
    schema::{posts, updoots},
    types::{DbId, VoteDirection},
};
use diesel::{insert_into, prelude::*};
use diesel_async::{
    pooled_connection::deadpool::Pool, scoped_futures::ScopedFutureExt, AsyncConnection,
    AsyncPgConnection, RunQueryDsl,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<diesel::result::Error> for VoteError {
    fn from(err: diesel::result::Error) -> Self {
        VoteError::Store(err.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote by this user on this post.
    Created,
    /// The user flipped an existing vote to the other direction.
    Switched,
    /// Same direction as the recorded vote; nothing was written.
    Unchanged,
}

#[derive(Debug, PartialEq, Eq)]
enum Transition {
    Insert { delta: i32 },
    Switch { delta: i32 },
    Noop,
}

/// The whole algorithm, minus I/O. A fresh vote contributes its own value;
/// flipping an existing vote has to retract the old contribution and apply
/// the new one, hence the factor of two.
fn transition(existing: Option<i32>, value: i32) -> Transition {
    match existing {
        None => Transition::Insert { delta: value },
        Some(recorded) if recorded == value => Transition::Noop,
        Some(_) => Transition::Switch { delta: 2 * value },
    }
}

/// Applies `user`'s vote on `post_id`. Re-casting the recorded direction is
/// an idempotent success. Both writes commit together or not at all; the
/// `FOR UPDATE` read serializes two in-flight votes on the same row, so
/// neither can compute its delta from a state the other is about to
/// replace.
pub async fn vote(
    user_id: &DbId,
    post_id: &DbId,
    direction: VoteDirection,
    db_pool: &Pool<AsyncPgConnection>,
) -> Result<VoteOutcome, VoteError> {
    let mut conn = db_pool.get().await.map_err(anyhow::Error::from)?;
    let value = direction.value();
    let post_id = post_id.clone();
    let user_id = user_id.clone();

    conn.transaction::<VoteOutcome, VoteError, _>(|conn| {
        async move {
            let existing = updoots::table
                .filter(updoots::post_id.eq(&post_id))
                .filter(updoots::user_id.eq(&user_id))
                .select(updoots::value)
                .for_update()
                .first::<i32>(conn)
                .await
                .optional()?;

            match transition(existing, value) {
                Transition::Noop => Ok(VoteOutcome::Unchanged),
                Transition::Insert { delta } => {
                    // The points update doubles as the existence check and
                    // takes the post's row lock before the vote row is
                    // written.
                    apply_points(conn, &post_id, delta).await?;

                    insert_into(updoots::table)
                        .values(Updoot {
                            post_id: post_id.clone(),
                            user_id: user_id.clone(),
                            value,
                            published: Utc::now(),
                        })
                        .execute(conn)
                        .await?;

                    Ok(VoteOutcome::Created)
                }
                Transition::Switch { delta } => {
                    apply_points(conn, &post_id, delta).await?;

                    diesel::update(
                        updoots::table
                            .filter(updoots::post_id.eq(&post_id))
                            .filter(updoots::user_id.eq(&user_id)),
                    )
                    .set(updoots::value.eq(value))
                    .execute(conn)
                    .await?;

                    Ok(VoteOutcome::Switched)
                }
            }
        }
        .scope_boxed()
    })
    .await
}

async fn apply_points(
    conn: &mut AsyncPgConnection,
    post_id: &DbId,
    delta: i32,
) -> Result<(), VoteError> {
    let rows_affected = diesel::update(posts::table.filter(posts::id.eq(post_id)))
        .set(posts::points.eq(posts::points + delta))
        .execute(conn)
        .await?;

    if rows_affected == 0 {
        return Err(VoteError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{transition, Transition};

    #[test]
    fn first_vote_contributes_its_own_value() {
        assert_eq!(transition(None, 1), Transition::Insert { delta: 1 });
        assert_eq!(transition(None, -1), Transition::Insert { delta: -1 });
    }

    #[test]
    fn repeated_direction_changes_nothing() {
        assert_eq!(transition(Some(1), 1), Transition::Noop);
        assert_eq!(transition(Some(-1), -1), Transition::Noop);
    }

    #[test]
    fn flipping_moves_points_by_two() {
        assert_eq!(transition(Some(-1), 1), Transition::Switch { delta: 2 });
        assert_eq!(transition(Some(1), -1), Transition::Switch { delta: -2 });
    }
}
