pub mod fedapay;
