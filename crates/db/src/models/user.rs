use chrono::{DateTime, Utc};
use diesel::{insert_into, prelude::*, result::Error::NotFound};
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection, RunQueryDsl};

use crate::{schema::users, types::DbId};

#[derive(
    Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, PartialEq, Clone, Eq,
)]
#[diesel(table_name = users)]
pub struct User {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub password_encrypted: String,
    pub published: DateTime<Utc>,
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_encrypted: String,
}

impl User {
    /// Unique violations on name/email are part of the registration
    /// contract; callers downcast to `diesel::result::Error` to tell them
    /// apart from store failures.
    pub async fn create(
        new_user: NewUser,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Self> {
        let user = User {
            id: DbId::default(),
            name: new_user.name,
            email: new_user.email,
            password_encrypted: new_user.password_encrypted,
            published: Utc::now(),
        };

        Ok(insert_into(users::table)
            .values(user)
            .get_result::<Self>(&mut db_pool.get().await?)
            .await?)
    }

    pub async fn by_id(
        id: &DbId,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        let user = users::table
            .filter(users::id.eq(id))
            .first::<Self>(&mut db_pool.get().await?)
            .await;
        match user {
            Ok(user) => Ok(Some(user)),
            Err(NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// One batched fetch for a page of ids; the per-request user loader is
    /// the only caller. Result order is whatever the store returns.
    pub async fn by_ids(
        ids: &[DbId],
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Vec<Self>> {
        Ok(users::table
            .filter(users::id.eq_any(ids))
            .load::<Self>(&mut db_pool.get().await?)
            .await?)
    }

    pub async fn by_name(
        name: &str,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        let user = users::table
            .filter(users::name.eq(name.to_string()))
            .first::<Self>(&mut db_pool.get().await?)
            .await;
        match user {
            Ok(user) => Ok(Some(user)),
            Err(NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn by_email(
        email: &str,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        let user = users::table
            .filter(users::email.eq(email.to_string()))
            .first::<Self>(&mut db_pool.get().await?)
            .await;
        match user {
            Ok(user) => Ok(Some(user)),
            Err(NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Sign-in accepts either identifier; anything containing `@` is an
    /// email, since usernames reject that character at registration.
    pub async fn by_name_or_email(
        name_or_email: &str,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<Option<Self>> {
        if name_or_email.contains('@') {
            Self::by_email(name_or_email, db_pool).await
        } else {
            Self::by_name(name_or_email, db_pool).await
        }
    }

    pub async fn update_password(
        &self,
        password_encrypted: String,
        db_pool: &Pool<AsyncPgConnection>,
    ) -> anyhow::Result<()> {
        diesel::update(self)
            .set(users::password_encrypted.eq(password_encrypted))
            .execute(&mut db_pool.get().await?)
            .await?;
        Ok(())
    }
}
