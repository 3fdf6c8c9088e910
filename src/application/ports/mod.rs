pub mod checkout;
pub mod notifier;
