// Gazette — Request dispatch
//
// Turns one JSON-RPC request into one store call and maps the outcome:
// duplicate insert → 409, missing get/update → 404, missing delete →
// success, missing fields → 400, closed store → 503, anything else → 500.
// DEKs and salts only ever leave through a successful `get`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{EscrowRepository, StoreError};

use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, CONFLICT, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, NOT_FOUND, STORE_UNAVAILABLE,
};

const MISSING_FIELDS: &str = "Missing required fields";

/// Fields accepted by the entry methods. Absent and empty strings are
/// treated the same.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryParams {
    password_hash: Option<String>,
    #[serde(rename = "encryptedDEK")]
    encrypted_dek: Option<String>,
    salt: Option<String>,
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurgeParams {
    max_age_ms: u64,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn parse_params<T: for<'de> Deserialize<'de> + Default>(params: &Value) -> Result<T, String> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone()).map_err(|e| e.to_string())
}

/// Parse and dispatch a single JSON-RPC request.
pub fn process_request(raw: &str, store: &dyn EscrowRepository) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => return JsonRpcResponse::parse_error(format!("Parse error: {}", e)),
    };

    if let Err(e) = request.validate() {
        return JsonRpcResponse::error(request.id, INVALID_REQUEST, e);
    }

    let id = request.id;
    let params = &request.params;

    let response = match request.method.as_str() {
        "insert" => handle_insert(store, id, params),
        "get" => handle_get(store, id, params),
        "update" => handle_update(store, id, params),
        "delete" => handle_delete(store, id, params),
        "list" => handle_list(store, id),
        "purge" => handle_purge(store, id, params),
        "health" => handle_health(store, id),
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {}", other)),
    };

    tracing::debug!(method = %request.method, status = response.status(), "Request handled");
    response
}

// ─── Method Handlers ─────────────────────────────────────────────────────────

fn handle_insert(store: &dyn EscrowRepository, id: Value, params: &Value) -> JsonRpcResponse {
    let p: EntryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e),
    };
    let (Some(hash), Some(dek), Some(salt)) =
        (present(&p.password_hash), present(&p.encrypted_dek), present(&p.salt))
    else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, MISSING_FIELDS);
    };

    match store.insert(hash, dek, salt) {
        Ok(()) => JsonRpcResponse::success(
            id,
            json!({ "message": "Entry created successfully", "passwordHash": hash }),
        ),
        Err(e) => store_error(id, e),
    }
}

fn handle_get(store: &dyn EscrowRepository, id: Value, params: &Value) -> JsonRpcResponse {
    let p: EntryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e),
    };
    let Some(hash) = present(&p.password_hash) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, MISSING_FIELDS);
    };

    match store.get(hash) {
        Ok(Some(entry)) => JsonRpcResponse::success(
            id,
            json!({
                "encryptedDEK": entry.encrypted_dek(),
                "salt": entry.salt(),
                "version": entry.version,
            }),
        ),
        Ok(None) => JsonRpcResponse::error(id, NOT_FOUND, "Entry not found"),
        Err(e) => store_error(id, e),
    }
}

fn handle_update(store: &dyn EscrowRepository, id: Value, params: &Value) -> JsonRpcResponse {
    let p: EntryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e),
    };
    let (Some(hash), Some(dek), Some(salt)) =
        (present(&p.password_hash), present(&p.encrypted_dek), present(&p.salt))
    else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, MISSING_FIELDS);
    };

    match store.update(hash, dek, salt, p.metadata.as_ref()) {
        Ok(true) => JsonRpcResponse::success(
            id,
            json!({ "message": "Entry updated successfully", "passwordHash": hash, "updated": true }),
        ),
        Ok(false) => JsonRpcResponse::error(id, NOT_FOUND, "Entry not found"),
        Err(e) => store_error(id, e),
    }
}

fn handle_delete(store: &dyn EscrowRepository, id: Value, params: &Value) -> JsonRpcResponse {
    let p: EntryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e),
    };
    let Some(hash) = present(&p.password_hash) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, MISSING_FIELDS);
    };

    // A missing entry is still a successful delete.
    match store.delete(hash) {
        Ok(deleted) => JsonRpcResponse::success(
            id,
            json!({
                "message": "Entry deleted successfully",
                "passwordHash": hash,
                "deleted": deleted,
            }),
        ),
        Err(e) => store_error(id, e),
    }
}

fn handle_list(store: &dyn EscrowRepository, id: Value) -> JsonRpcResponse {
    match store.list_all() {
        Ok(summaries) => match serde_json::to_value(&summaries) {
            Ok(json) => JsonRpcResponse::success(id, json),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        },
        Err(e) => store_error(id, e),
    }
}

fn handle_purge(store: &dyn EscrowRepository, id: Value, params: &Value) -> JsonRpcResponse {
    let p: PurgeParams = match serde_json::from_value(params.clone()) {
        Ok(p) => p,
        Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing or invalid 'maxAgeMs'"),
    };

    match store.purge_older_than(Duration::from_millis(p.max_age_ms)) {
        Ok(purged) => JsonRpcResponse::success(id, json!({ "purged": purged })),
        Err(e) => store_error(id, e),
    }
}

fn handle_health(store: &dyn EscrowRepository, id: Value) -> JsonRpcResponse {
    match store.count() {
        Ok(entries) => JsonRpcResponse::success(
            id,
            json!({
                "status": "ok",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "version": env!("CARGO_PKG_VERSION"),
                "entries": entries,
            }),
        ),
        Err(e) => store_error(id, e),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn store_error(id: Value, err: StoreError) -> JsonRpcResponse {
    match err {
        StoreError::DuplicateKey { .. } => JsonRpcResponse::error(id, CONFLICT, "Entry already exists"),
        StoreError::InvalidInput(field) => {
            JsonRpcResponse::error(id, INVALID_PARAMS, format!("'{}' must not be empty", field))
        }
        StoreError::Closed => {
            tracing::warn!("Request rejected, escrow store is closed");
            JsonRpcResponse::error(id, STORE_UNAVAILABLE, "Escrow store is shutting down")
        }
        other => {
            tracing::error!(error = %other, "Escrow store failure");
            JsonRpcResponse::error(id, INTERNAL_ERROR, "Internal server error")
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
