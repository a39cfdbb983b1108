use anyhow::anyhow;
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection};
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{models::User, types::DbId, utils::random_string};

const RESET_TTL_SECONDS: i64 = 60 * 60;

/// A single-use password-reset token, held in redis with a one hour expiry
/// rather than in the relational store.
pub struct PasswordReset {
    pub token: String,
    pub user_id: DbId,
}

impl PasswordReset {
    pub async fn create(user_id: DbId, redis: &mut ConnectionManager) -> anyhow::Result<Self> {
        let token = random_string(32);
        let key = format!("password_reset:{}", token);

        let _: () = redis.set(&key, user_id.to_string()).await?;
        let _: () = redis.expire(&key, RESET_TTL_SECONDS).await?;

        Ok(PasswordReset { token, user_id })
    }

    pub async fn by_token(
        token: &str,
        redis: &mut ConnectionManager,
    ) -> anyhow::Result<Option<Self>> {
        let user_id: Option<String> = redis.get(format!("password_reset:{}", token)).await?;

        Ok(user_id.map(|user_id| PasswordReset {
            token: token.to_string(),
            user_id: user_id.into(),
        }))
    }

    pub async fn user(&self, db_pool: &Pool<AsyncPgConnection>) -> anyhow::Result<User> {
        match User::by_id(&self.user_id, db_pool).await? {
            Some(user) => Ok(user),
            None => Err(anyhow!("User sucked into a black hole")),
        }
    }

    pub async fn delete(&self, redis: &mut ConnectionManager) -> anyhow::Result<()> {
        let _: () = redis.del(format!("password_reset:{}", self.token)).await?;
        Ok(())
    }
}
