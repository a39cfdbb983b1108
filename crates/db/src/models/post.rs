use chrono::{DateTime, Utc};
use diesel::{delete, insert_into, prelude::*, result::Error::NotFound};
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection, RunQueryDsl};

use crate::{
    models::User,
    pagination::Pagination,
    schema::posts,
    types::DbId,
};

#[derive(
    Queryable, Insertable, Identifiable, AsChangeset, Selectable, Debug, PartialEq, Clone, Eq,
)]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: DbId,
    pub author: DbId,
    pub title: String,
    pub content: String,
    /// Stored aggregate: always equals the sum of this post's updoot
    /// values. Only the vote engine writes it, and only together with the
    /// updoot row in one transaction.
    pub points: i32,
    pub published: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

pub struct NewPost {
    pub title: String,
    pub content: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = posts)]
pub struct PostChange {
    pub title: String,
    pub content: String,
    pub updated: DateTime<Utc>,
}

impl Post {
    pub async fn create(
        author: &User,
        new_post: NewPost,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Self> {
        let post = Post {
            id: DbId::default(),
            author: author.id.clone(),
            title: new_post.title,
            content: new_post.content,
            points: 0,
            published: Utc::now(),
            updated: None,
        };

        Ok(insert_into(posts::table)
            .values(post)
            .get_result::<Self>(&mut db_pool.get().await?)
            .await?)
    }

    pub async fn by_id(
        id: &DbId,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        let post = posts::table
            .filter(posts::id.eq(id))
            .first::<Self>(&mut db_pool.get().await?)
            .await;
        match post {
            Ok(post) => Ok(Some(post)),
            Err(NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Newest-first feed page. Fetches one row past the limit so the caller
    /// learns whether another page exists without a count query.
    pub async fn list(
        pagination: &Pagination,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<(Vec<Self>, bool)> {
        let mut query = posts::table
            .order(posts::id.desc())
            .limit(pagination.limit + 1)
            .into_boxed();

        if let Some(cursor) = &pagination.cursor {
            query = query.filter(posts::id.lt(cursor));
        }

        let mut page = query.load::<Self>(&mut db_pool.get().await?).await?;

        let has_more = page.len() as i64 > pagination.limit;
        page.truncate(pagination.limit as usize);

        Ok((page, has_more))
    }

    /// Updates title/content if the post belongs to `author`. Returns the
    /// changed row, or `None` when no row matched (absent or foreign).
    pub async fn update_own(
        id: &DbId,
        author: &DbId,
        change: PostChange,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        Ok(diesel::update(
            posts::table
                .filter(posts::id.eq(id))
                .filter(posts::author.eq(author)),
        )
        .set(change)
        .get_result::<Self>(&mut db_pool.get().await?)
        .await
        .optional()?)
    }

    /// The store cascades the delete to the post's updoots, so no vote row
    /// can outlive its post.
    pub async fn delete_own(
        id: &DbId,
        author: &DbId,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<bool> {
        let rows_affected = delete(
            posts::table
                .filter(posts::id.eq(id))
                .filter(posts::author.eq(author)),
        )
        .execute(&mut db_pool.get().await?)
        .await?;

        Ok(rows_affected == 1)
    }

    pub async fn author(&self, db_pool: &Pool<AsyncPgConnection>) -> anyhow::Result<User> {
        User::by_id(&self.author, db_pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("post author is gone"))
    }
}
