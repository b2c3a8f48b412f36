pub mod deque;
pub mod type_map;

pub use deque::Deque;
pub use type_map::TypeMap;
