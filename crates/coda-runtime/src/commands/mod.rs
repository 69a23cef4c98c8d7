mod format;
mod general;

pub use format::format_number;
pub use general::{general_commands, register_general_commands};
