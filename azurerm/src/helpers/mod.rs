//! Helpers shared by resources: schema fragments, value conversion, tags,
//! locations and timeouts.

pub mod expand;
pub mod location;
pub mod schema;
pub mod state;
pub mod tags;
pub mod timeouts;
pub mod values;
