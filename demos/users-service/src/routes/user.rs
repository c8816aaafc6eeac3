//! `/users/{id}`: fetch and delete one user.

use serde_json::json;
use sluice::prelude::*;
use sluice::route::RouteError;

use super::{public_user, STORE};
use crate::store::UserStore;

fn id_params() -> RequestSchemas {
    RequestSchemas::new().params(SchemaMap::new().field("id", FieldSchema::string().required().min(1)))
}

fn not_found(id: &str) -> Reply {
    Reply::new(json!({ "success": false, "error": "User not found", "id": id }))
        .with_status(StatusCode::NOT_FOUND)
}

fn id_of(inv: &Invocation) -> String {
    inv.validated()
        .params()
        .and_then(|params| params.get("id"))
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string()
}

async fn fetch(inv: Invocation) -> HandlerResult {
    let id = id_of(&inv);
    let store = inv.module::<UserStore>(STORE).await?;
    match store.get(&id) {
        Some(user) => Reply::json(&user),
        None => Ok(not_found(&id)),
    }
}

async fn remove(inv: Invocation) -> HandlerResult {
    let id = id_of(&inv);
    let store = inv.module::<UserStore>(STORE).await?;
    match store.delete(&id) {
        Some(user) => {
            tracing::info!(request_id = %inv.context().request_id(), user_id = %user.id, "user deleted");
            Ok(Reply::new(json!({ "id": user.id, "deleted": true, "user": user })))
        }
        None => Ok(not_found(&id)),
    }
}

/// Builds the `/users/{id}` route.
pub fn route() -> Result<CompiledRoute, RouteError> {
    RouteContract::new("user")
        .get_validated_with_params(
            ["id"],
            id_params(),
            ResponseSchemas::new().status(StatusCode::OK, public_user()),
            fetch,
        )
        .delete_validated_with_params(
            ["id"],
            id_params(),
            ResponseSchemas::new().status(
                StatusCode::OK,
                SchemaMap::new()
                    .field("id", FieldSchema::string().required())
                    .field("deleted", FieldSchema::boolean().required()),
            ),
            remove,
        )
        .build()
}
