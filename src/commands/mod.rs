mod convert;
mod serve;

pub use convert::{run_convert, ConvertArgs};
pub use serve::run_serve;
