pub mod check;
pub mod fetch;
pub mod hash;
pub mod quote;
