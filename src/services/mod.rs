/// Room snapshot and notice fan-out to connected clients.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Post-game ratings.
pub mod feedback_service;
/// Health check service.
pub mod health_service;
/// Results assembly and caching.
pub mod results_service;
/// Per-room task serialising every room event.
pub mod room_actor;
/// Room creation, routing and lookup.
pub mod room_service;
/// Time-weighted scoring.
pub mod scoring;
/// Single-player runs over HTTP.
pub mod solo_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
