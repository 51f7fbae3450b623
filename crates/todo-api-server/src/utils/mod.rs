pub mod error;
pub mod extract;
pub mod keyed_lock;
pub mod response;

pub use error::ApiError;
pub use extract::ApiJson;
pub use keyed_lock::KeyedLocks;
pub use response::ApiResponse;
