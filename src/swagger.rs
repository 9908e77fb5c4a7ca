use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::ActivityState;
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::raffle::create_activity,
        handlers::raffle::list_activities,
        handlers::raffle::list_open_activities,
        handlers::raffle::list_history,
        handlers::raffle::match_join,
        handlers::raffle::list_failed_draws,
        handlers::raffle::get_activity,
        handlers::raffle::join,
        handlers::raffle::has_joined,
        handlers::raffle::cancel,
        handlers::raffle::attach_announcement,
        handlers::raffle::redraw,
        handlers::raffle::delete_activity,
    ),
    components(
        schemas(
            ActivityState,
            Activity,
            PrizeLine,
            Participant,
            WinnerRecord,
            ActivityDetail,
            CreateActivityRequest,
            JoinRequest,
            JoinResult,
            HasJoinedResponse,
            AttachAnnouncementRequest,
            CancelResponse,
            RaffleEvent,
            ActivityPage,
            ErrorBody,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "raffle", description = "Raffle activity API"),
        (name = "raffle-admin", description = "Operator API for failed draws"),
    ),
    info(
        title = "Raffle Backend API",
        version = "1.0.0",
        description = "Timed group give-away engine REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
