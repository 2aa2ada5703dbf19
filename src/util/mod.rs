mod format;

pub use format::{epoch_seconds, format_hms, format_size};
