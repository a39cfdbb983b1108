use chrono::{DateTime, Utc};
use db::{models::User, types::DbId};
use serde::Serialize;

#[derive(Clone, Serialize, Debug)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// Present only when the account belongs to the viewer; everyone else
    /// gets an empty string.
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn build(user: User, viewer: Option<&DbId>) -> Self {
        let own_account = viewer.is_some_and(|viewer| *viewer == user.id);

        Account {
            id: user.id.to_string(),
            username: user.name,
            email: if own_account {
                user.email
            } else {
                String::new()
            },
            created_at: user.published,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::{models::User, types::DbId};

    use super::Account;

    fn user() -> User {
        User {
            id: DbId::default(),
            name: String::from("maksales"),
            email: String::from("maksales@example.com"),
            password_encrypted: String::from("$argon2id$..."),
            published: Utc::now(),
        }
    }

    #[test]
    fn email_is_visible_to_its_owner_only() {
        let user = user();
        let id = user.id.clone();
        let stranger = DbId::default();

        let own = Account::build(user.clone(), Some(&id));
        assert_eq!(own.email, "maksales@example.com");

        let foreign = Account::build(user.clone(), Some(&stranger));
        assert_eq!(foreign.email, "");

        let anonymous = Account::build(user, None);
        assert_eq!(anonymous.email, "");
    }
}
