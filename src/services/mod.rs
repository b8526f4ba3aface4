pub mod warranties;

pub use warranties::WarrantyService;
