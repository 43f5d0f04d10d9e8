pub mod check;
pub mod query;
