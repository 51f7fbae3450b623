pub mod todo;

pub use todo::{Todo, TodoFilter, TodoList, TodoPatch, TodoStats};
