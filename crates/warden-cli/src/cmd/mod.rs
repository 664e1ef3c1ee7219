pub mod check;
pub mod enforce;
pub mod validate;
