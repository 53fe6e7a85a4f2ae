//! Network layer: transport seam, request coalescing, and the REST client.

pub mod api;
pub mod coalesce;
pub mod transport;
pub mod types;
