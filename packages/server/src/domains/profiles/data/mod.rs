pub mod profile;

pub use profile::ProfileData;
