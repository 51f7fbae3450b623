pub mod memory_store;
pub mod remote_store;
pub mod todo_service;

pub use memory_store::InMemoryStore;
#[cfg(test)]
pub use remote_store::MockRemoteStore;
pub use remote_store::{
    HttpRemoteStore, LoginPayload, RegisterPayload, RemoteError, RemoteStore, SetOptions,
};
pub use todo_service::{todos_key, TodoService};
