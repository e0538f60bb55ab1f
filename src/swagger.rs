use axum::Router;
use utoipa::openapi::{
    OpenApi,
    security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;

/// Registers the `bearerAuth` scheme referenced by the handlers and serves the document at
/// `/api-docs/openapi.json` with Swagger UI at `/swagger-ui`.
pub fn create_swagger_ui(mut openapi: OpenApi) -> Router<AppState> {
    let components = openapi.components.get_or_insert_with(Default::default);
    components.add_security_scheme(
        "bearerAuth",
        SecurityScheme::Http(
            Http::builder()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
    );

    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
}
