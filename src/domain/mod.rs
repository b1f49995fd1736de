// Domain layer: handles, declared resources, the request contract and the
// unit/storage ports. Nothing here knows the unit graph or the filesystem.

pub mod model;
pub mod ports;
pub mod schema;
