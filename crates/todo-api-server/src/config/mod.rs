mod settings;

pub use settings::{
    CorsConfig, LoggingConfig, RemoteBackend, RemoteConfig, ServerConfig, SessionConfig, Settings,
};
