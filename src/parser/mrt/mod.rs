pub mod messages;
pub mod mrt_record;

pub use messages::*;
pub use mrt_record::*;
