//! In-memory user store.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned ID (UUID v7).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Optional age. Never exposed by the public routes.
    pub age: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for [`UserStore::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Optional age.
    pub age: Option<i64>,
}

/// Returned when an email is already registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("email '{0}' is already registered")]
pub struct EmailTaken(pub String);

/// Criteria for [`UserStore::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFilter<'a> {
    /// Keep users whose name starts with this.
    pub name_prefix: Option<&'a str>,
    /// Keep users of exactly this age.
    pub age: Option<i64>,
}

impl UserFilter<'_> {
    fn matches(&self, user: &User) -> bool {
        self.name_prefix.map_or(true, |prefix| user.name.starts_with(prefix))
            && self.age.map_or(true, |age| user.age == Some(age))
    }
}

/// Users in insertion order.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding two sample users.
    pub fn seeded() -> Self {
        let store = Self::new();
        for (name, email) in [("Alice Smith", "alice@example.com"), ("Bob Johnson", "bob@example.com")] {
            // The sample emails are distinct.
            let _ = store.create(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                age: None,
            });
        }
        store
    }

    /// Lists matching users in creation order.
    pub fn list(&self, filter: &UserFilter<'_>, limit: usize, offset: usize) -> Vec<User> {
        self.users
            .read()
            .iter()
            .filter(|user| filter.matches(user))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Looks up a user.
    pub fn get(&self, id: &str) -> Option<User> {
        self.users.read().iter().find(|user| user.id == id).cloned()
    }

    /// Inserts a user.
    pub fn create(&self, new_user: NewUser) -> Result<User, EmailTaken> {
        let mut users = self.users.write();
        let email = new_user.email.to_lowercase();
        if users.iter().any(|user| user.email == email) {
            return Err(EmailTaken(email));
        }
        let user = User {
            id: Uuid::now_v7().to_string(),
            name: new_user.name,
            email,
            age: new_user.age,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    /// Removes a user, returning it if it existed.
    pub fn delete(&self, id: &str) -> Option<User> {
        let mut users = self.users.write();
        let index = users.iter().position(|user| user.id == id)?;
        Some(users.remove(index))
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            age: Some(30),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = UserStore::new();
        let user = store.create(new_user("Carol", "Carol@Example.com")).unwrap();
        assert_eq!(user.email, "carol@example.com");
        assert_eq!(store.get(&user.id), Some(user));
    }

    #[test]
    fn test_duplicate_email() {
        let store = UserStore::new();
        store.create(new_user("Carol", "carol@example.com")).unwrap();
        let err = store.create(new_user("Other", "CAROL@example.com")).unwrap_err();
        assert_eq!(err, EmailTaken("carol@example.com".to_string()));
        assert_eq!(err.to_string(), "email 'carol@example.com' is already registered");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_filters_and_pages() {
        let store = UserStore::seeded();
        store.create(new_user("Alan", "alan@example.com")).unwrap();

        let filter = UserFilter {
            name_prefix: Some("Al"),
            ..UserFilter::default()
        };
        let names: Vec<String> = store.list(&filter, 10, 0).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Alice Smith", "Alan"]);

        let filter = UserFilter {
            age: Some(30),
            ..UserFilter::default()
        };
        assert_eq!(store.list(&filter, 10, 0).len(), 1);

        let all = UserFilter::default();
        assert_eq!(store.list(&all, 1, 1).len(), 1);
        assert!(store.list(&all, 10, 5).is_empty());
    }

    #[test]
    fn test_delete() {
        let store = UserStore::seeded();
        let id = store.list(&UserFilter::default(), 1, 0)[0].id.clone();
        assert!(store.delete(&id).is_some());
        assert!(store.delete(&id).is_none());
        assert_eq!(store.len(), 1);
    }
}
