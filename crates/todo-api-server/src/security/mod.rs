pub mod cors;
pub mod middleware;
pub mod session;

pub use cors::cors_layer;
pub use middleware::session_middleware;
pub use session::{session_key, AuthSession, Session, SessionManager};
