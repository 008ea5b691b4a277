//! Core traits for resolving values from a container or scope.

mod resolver;

pub use resolver::{Resolver, ResolverCore};
