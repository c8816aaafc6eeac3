//! Users service built on Sluice.
//!
//! | Route | Verb | Registration |
//! |-------|------|--------------|
//! | `/users` | `GET` | validated query, unshaped list |
//! | `/users` | `POST` | validated body, `201` shaped to public fields |
//! | `/users/{id}` | `GET`, `DELETE` | validated path parameters |
//! | `/diagnostics` | `GET` | plain |
//! | `/diagnostics` | `POST` | validated, errors propagate |

pub mod routes;
pub mod store;

use sluice::config::SluiceConfig;
use sluice::core::ModuleRegistry;
use sluice::route::RouteError;
use sluice::server::Server;

use crate::store::UserStore;

/// Modules shared by every route. The store is built on first use.
pub fn modules(config: &SluiceConfig) -> ModuleRegistry {
    ModuleRegistry::builder()
        .module(routes::STORE, || async {
            tracing::info!("seeding user store");
            Ok(UserStore::seeded())
        })
        .instance(routes::SERVICE, config.service.clone())
        .build()
}

/// Compiles every route and assembles the server.
pub fn server(config: &SluiceConfig) -> Result<Server, RouteError> {
    Ok(Server::builder()
        .config(config.server_config())
        .modules(modules(config))
        .mount("/users", routes::users::route()?)
        .mount("/users/{id}", routes::user::route()?)
        .mount("/diagnostics", routes::diagnostics::route()?)
        .build())
}
