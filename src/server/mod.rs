pub mod guards;
pub mod router;
pub mod routes;
pub mod state;

pub use router::gateway_router;
pub use state::AppState;
