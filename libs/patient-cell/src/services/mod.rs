pub mod patient;
pub mod records;
