pub mod approve_warranty_command;
pub mod decline_warranty_command;
pub mod register_warranty_command;

pub use approve_warranty_command::ApproveWarrantyCommand;
pub use decline_warranty_command::DeclineWarrantyCommand;
pub use register_warranty_command::RegisterWarrantyCommand;
