//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "0.1.0",
        description = "Book catalog and loan management REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::sign_up,
        auth::sign_in,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::create_loans,
        loans::get_user_loans,
        loans::get_loan,
        loans::update_loan,
        loans::return_loans,
    ),
    components(
        schemas(
            // Auth
            auth::SignInResponse,
            crate::models::user::User,
            crate::models::user::SignUp,
            crate::models::user::SignIn,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::NewLoan,
            crate::models::loan::CreateLoans,
            crate::models::loan::ReturnLoans,
            crate::models::loan::ReturnCount,
            crate::models::loan::UpdateLoan,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Signup and signin"),
        (name = "books", description = "Book catalog management"),
        (name = "loans", description = "Loan management")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
