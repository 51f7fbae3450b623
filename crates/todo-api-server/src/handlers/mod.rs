pub mod auth;
pub mod fallback;
pub mod health;
pub mod todos;

pub use fallback::fallback;
pub use health::health_check;
