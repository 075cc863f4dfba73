use crate::{
    controller::{health_check_controller, oauth_controller, page_controller, token_controller},
    middleware::api_key::require_api_key,
    AppState,
};
use axum::{middleware::from_fn_with_state, routing::get, Router};
use broker_auth::api_key::API_KEY_HEADER;

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Mercado Libre Token Broker API"
        ),
        paths(
            health_check_controller::health_check,
            oauth_controller::login,
            oauth_controller::callback,
            oauth_controller::refresh,
            token_controller::read,
        ),
        components(
            schemas(
                token_controller::TokenResponse,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "token_broker", description = "OAuth2 PKCE token broker for the Mercado Libre API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Defines the shared API key requirement of the token endpoint for OpenAPI.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    API_KEY_HEADER,
                    "Shared key issued to the consumers of the cached token",
                ))),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(oauth_routes(app_state.clone()))
        .merge(page_routes(app_state.clone()))
        .merge(token_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn oauth_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/login", get(oauth_controller::login))
        .route("/callback", get(oauth_controller::callback))
        .route("/refresh", get(oauth_controller::refresh))
        .with_state(app_state)
}

fn page_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(page_controller::index))
        .route("/permissions", get(page_controller::permissions))
        .route("/privacy", get(page_controller::privacy))
        .route("/terms", get(page_controller::terms))
        .with_state(app_state)
}

fn token_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/token", get(token_controller::read))
        .route_layer(from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}
