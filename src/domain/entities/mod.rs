pub mod account;
pub mod entitlements;
pub mod processor_event;
