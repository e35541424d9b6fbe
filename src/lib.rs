mod allocate;
mod circuit;
mod driver;
mod error;
mod hosting;
mod loadcase;
mod opt;
mod order;
mod pf;
mod profile;
mod radial;
mod reactive;
mod results;
mod scenario;
mod traits;

pub mod debug;
pub mod math;

#[cfg(test)]
mod tests;

pub use allocate::*;
pub use circuit::*;
pub use driver::*;
pub use error::*;
pub use hosting::*;
pub use loadcase::*;
pub use opt::*;
pub use order::*;
pub use pf::*;
pub use profile::*;
pub use reactive::*;
pub use results::*;
pub use scenario::*;
pub use traits::*;
