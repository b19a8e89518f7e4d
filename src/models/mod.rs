pub mod descriptor;
pub mod query;
pub mod record;

pub use descriptor::*;
pub use query::*;
pub use record::*;
