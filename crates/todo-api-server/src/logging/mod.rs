//! Request correlation logging, redaction and subscriber setup

mod logger;
pub mod redact;
pub mod telemetry;
pub mod types;

pub use logger::{request_logger, RequestLogger};
pub use redact::{Redactor, REDACTED};
pub use telemetry::init_telemetry;
pub use types::{CorrelationId, CorrelationRecord, CORRELATION_HEADER};
