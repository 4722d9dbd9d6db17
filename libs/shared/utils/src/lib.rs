pub mod extractor;
pub mod jwt;
pub mod policy;
pub mod state;
pub mod test_utils;

pub use state::AppState;
