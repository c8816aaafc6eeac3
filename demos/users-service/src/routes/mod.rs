//! Route contracts.

pub mod diagnostics;
pub mod user;
pub mod users;

use sluice::core::{FieldSchema, SchemaMap};

/// Registry name of the [`UserStore`](crate::store::UserStore).
pub const STORE: &str = "store";

/// Registry name of the service identity.
pub const SERVICE: &str = "service";

/// Fields of a user that leave the service.
fn public_user() -> SchemaMap {
    SchemaMap::new()
        .field("id", FieldSchema::string().required())
        .field("name", FieldSchema::string().required())
        .field("email", FieldSchema::email().required())
        .field("createdAt", FieldSchema::string().required())
}
