//! A small document API protected by per-route scope policies
//!
//! Expects a `JWKS_URL` and `AUDIENCE` for the issuing authority, then
//! serves endpoints mirroring a typical resource API: anyone with a
//! valid token can list their own scopes, while reading and creating
//! documents require the corresponding grants.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use gatekey::{jwa, jwt};
use gatekey_oauth2::{scope, Authority, ScopePolicy};
use gatekey_tower::Oauth2Authorizer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let jwks_url = std::env::var("JWKS_URL")?;
    let audience = std::env::var("AUDIENCE").unwrap_or_else(|_| "account".into());

    let validator = jwt::TokenValidator::default()
        .add_approved_algorithm(jwa::Algorithm::RS256)
        .add_allowed_audience(jwt::Audience::from(audience));

    let authority = Authority::from_remote(jwks_url, validator).await?;
    authority.spawn_refresh(Duration::from_secs(600));

    let authorizer = Oauth2Authorizer::new().with_verbose_error_handler();

    let app = Router::new()
        .route("/my-scopes", get(my_scopes))
        .route(
            "/docs",
            get(read_doc)
                .layer(authorizer.scope_layer(ScopePolicy::allow_one(scope!["example:doc:read"]))),
        )
        .route(
            "/docs/new",
            post(create_doc).layer(
                authorizer.scope_layer(ScopePolicy::allow_one(scope!["example:doc:create"])),
            ),
        )
        .layer(authorizer.jwt_layer(authority));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn my_scopes(
    Extension(claims): Extension<gatekey_oauth2::ClaimsWithScope>,
) -> Json<Vec<String>> {
    Json(claims.scope.iter().map(|t| t.as_str().to_owned()).collect())
}

async fn read_doc() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "details": "you have the scope required to read a doc",
    }))
}

async fn create_doc() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "details": "you have the scope required to create a doc",
    }))
}
