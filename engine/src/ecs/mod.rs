pub mod component;
pub mod entity;
pub mod registry;
pub mod schedule;
pub mod storage;
pub mod types;
pub(crate) mod util;
pub mod view;

pub use component::{Component, ComponentSet, component_id};
pub use entity::Entity;
pub use registry::Registry;
pub use types::{ArchetypeId, ComponentId, MAX_ARCHETYPES, Signature, ViewId};
pub use view::{Query, SubView, View};
