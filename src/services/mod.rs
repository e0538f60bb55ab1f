pub mod accounts;
pub mod orders;
pub mod payments;
pub mod products;
pub mod webhooks;
