use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the live quiz backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::rooms::get_room,
        crate::routes::sessions::get_results,
        crate::routes::sessions::post_feedback,
        crate::routes::solo::start,
        crate::routes::solo::answer,
        crate::routes::solo::finish,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::rooms::RoomSummary,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::RoomStateView,
            crate::dto::results::SessionResults,
            crate::dto::feedback::FeedbackRequest,
            crate::dto::solo::SoloStartRequest,
            crate::dto::solo::SoloStartResponse,
            crate::dto::solo::SoloAnswerRequest,
            crate::dto::solo::SoloAnswerResponse,
            crate::dto::solo::SoloFinishResponse,
            crate::state::state_machine::RoomPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Live rooms and the quiz WebSocket"),
        (name = "sessions", description = "Results and feedback of finished sessions"),
        (name = "solo", description = "Single-player quiz runs"),
    )
)]
pub struct ApiDoc;
