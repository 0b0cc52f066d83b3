//! Data sources

mod client_config;
mod resource_group;

pub use client_config::ClientConfigDataSource;
pub use resource_group::ResourceGroupDataSource;
