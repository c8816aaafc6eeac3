//! `/users`: list and create.

use serde::Deserialize;
use serde_json::json;
use sluice::prelude::*;
use sluice::route::RouteError;

use super::{public_user, STORE};
use crate::store::{NewUser, UserFilter, UserStore};

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct ListQuery {
    name: Option<String>,
    age: Option<f64>,
    limit: Option<f64>,
    offset: Option<f64>,
}

fn list_query() -> SchemaMap {
    SchemaMap::new()
        .field("name", FieldSchema::string().min(2))
        .field("age", FieldSchema::number().min(0))
        .field("limit", FieldSchema::number().min(1).max(100))
        .field("offset", FieldSchema::number().min(0))
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    name: String,
    email: String,
    age: Option<f64>,
}

fn create_body() -> SchemaMap {
    SchemaMap::new()
        .field("name", FieldSchema::string().required().min(2).max(64))
        .field("email", FieldSchema::email().required())
        .field("age", FieldSchema::number().min(0).max(150))
}

// Bounds are enforced by the query schema.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count(value: Option<f64>, default: usize) -> usize {
    value.map_or(default, |v| v.floor() as usize)
}

#[allow(clippy::cast_possible_truncation)]
fn whole(value: f64) -> Option<i64> {
    (value.fract() == 0.0).then(|| value as i64)
}

async fn list(inv: Invocation) -> HandlerResult {
    let query: ListQuery = inv.query_as()?;
    let store = inv.module::<UserStore>(STORE).await?;

    let age = match query.age {
        Some(age) => match whole(age) {
            Some(age) => Some(age),
            None => return Ok(Reply::new(json!({ "total": 0, "users": [] }))),
        },
        None => None,
    };
    let filter = UserFilter {
        name_prefix: query.name.as_deref(),
        age,
    };
    let users: Vec<serde_json::Value> = store
        .list(&filter, count(query.limit, DEFAULT_LIMIT), count(query.offset, 0))
        .into_iter()
        .map(|user| {
            json!({
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "createdAt": user.created_at,
            })
        })
        .collect();

    Ok(Reply::new(json!({ "total": users.len(), "users": users })))
}

async fn create(inv: Invocation) -> HandlerResult {
    let body: CreateBody = inv.body_as()?;
    let age = match body.age {
        Some(age) => Some(whole(age).ok_or_else(|| {
            HandlerError::new("age must be a whole number").with_status(StatusCode::BAD_REQUEST)
        })?),
        None => None,
    };
    let new_user = NewUser {
        name: body.name,
        email: body.email,
        age,
    };
    let store = inv.module::<UserStore>(STORE).await?;

    match store.create(new_user) {
        Ok(user) => {
            tracing::info!(request_id = %inv.context().request_id(), user_id = %user.id, "user created");
            Ok(Reply::json(&user)?.with_status(StatusCode::CREATED))
        }
        Err(taken) => Err(HandlerError::new(taken.to_string()).with_status(StatusCode::CONFLICT)),
    }
}

/// Builds the `/users` route.
pub fn route() -> Result<CompiledRoute, RouteError> {
    RouteContract::new("users")
        .get_validated(RequestSchemas::new().query(list_query()), ResponseSchemas::new(), list)
        .post_validated(
            RequestSchemas::new().body(create_body()),
            ResponseSchemas::new().status(StatusCode::CREATED, public_user()),
            create,
        )
        .not_found(|inv: Invocation| async move {
            Ok(Reply::new(json!({
                "success": false,
                "error": format!("{} is not supported on /users", inv.request().method()),
            })))
        })
        .build()
}
