mod destination;
mod tracker;

pub use destination::*;
pub use tracker::*;
