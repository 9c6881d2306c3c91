//! Stream resources and compression used by the file adapters.

pub mod compression;
mod resource;

pub use resource::Resource;
