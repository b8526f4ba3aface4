pub mod warranty_registration;

pub use warranty_registration::ReviewStatus;
