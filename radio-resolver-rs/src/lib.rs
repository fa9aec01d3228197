pub mod app_state;
pub mod channels;
pub mod clock;
pub mod config;
pub mod directory;
pub mod http;
pub mod journal;
pub mod logging;
pub mod matcher;
pub mod resolver;
pub mod stations;
pub mod store;
pub mod stream_validation;

pub use resolver::{Resolver, ResolverDeps};
pub use stations::Station;
