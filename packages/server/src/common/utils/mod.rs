pub mod content_hash;
pub mod text;

pub use content_hash::*;
pub use text::*;
