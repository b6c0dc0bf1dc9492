pub mod customer;
pub mod purchase;

pub use customer::Customer;
pub use purchase::{FulfillTransition, InvoiceType, NewPurchase, ParseEnumError, Purchase, PurchaseStatus};
