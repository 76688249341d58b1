//! RecordStore: generic CRUD using the safe SQL builder.

mod decode;
mod record;
pub use record::{RecordStore, Row};
