//! Safe SQL builder: identifiers pass the grammar gate, values go as parameters.

mod builder;
pub mod ident;
pub mod params;
pub use builder::*;
pub use ident::validate_identifier;
pub use params::*;
