pub mod distribution;
pub mod geo;
pub mod macros;
pub mod population;
pub mod route;
pub mod target;

pub use distribution::*;
pub use geo::*;
pub use population::*;
pub use route::*;
pub use target::*;
