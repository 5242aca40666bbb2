pub mod data;
pub mod models;

pub use data::ResumeData;
pub use models::{Resume, ResumeInput};
