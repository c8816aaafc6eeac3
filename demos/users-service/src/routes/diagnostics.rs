//! `/diagnostics`: registry introspection and a failure probe.

use serde_json::json;
use sluice::config::ServiceSection;
use sluice::prelude::*;
use sluice::route::RouteError;

use super::SERVICE;

async fn report(inv: Invocation) -> HandlerResult {
    let service = inv.module::<ServiceSection>(SERVICE).await?;
    let registry = inv.modules().registry();
    let names = registry.names();
    let resolved: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| registry.is_resolved(name))
        .collect();

    Ok(Reply::new(json!({
        "service": service.name,
        "version": service.version,
        "modules": names,
        "resolved": resolved,
    })))
}

// Errors from this handler bypass the envelope and surface as a bare 500.
async fn fail(inv: Invocation) -> HandlerResult {
    let reason = inv
        .validated()
        .body()
        .and_then(|body| body.get("reason"))
        .and_then(|reason| reason.as_str())
        .unwrap_or_default()
        .to_string();
    tracing::warn!(request_id = %inv.context().request_id(), reason = %reason, "forced failure requested");
    Err(HandlerError::new(format!("forced failure: {reason}")))
}

/// Builds the `/diagnostics` route.
pub fn route() -> Result<CompiledRoute, RouteError> {
    RouteContract::new("diagnostics")
        .get(report)
        .post_validated_unsafe(
            RequestSchemas::new().body(SchemaMap::new().field("reason", FieldSchema::string().required())),
            fail,
        )
        .build()
}
