pub mod container;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod router;
pub mod view;

pub use container::{Container, ContainerConfig};
pub use error::ApiError;
pub use router::router;
