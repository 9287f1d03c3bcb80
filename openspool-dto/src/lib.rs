pub mod client;
pub mod descriptor;
pub mod encodings;
pub mod error;
pub mod mapper;
pub mod params;
pub mod records;
pub mod spoolman;
pub mod validate;

pub use descriptor::{ColorHex, TagDescriptor};
pub use error::JsonError;
pub use mapper::map_spool;
pub use records::{find_descriptor, ScanOutcome, TagRecord};
pub use spoolman::{Filament, Spool, Vendor};
pub use validate::{validate, ValidationError, Validator};
