pub mod memory;
pub mod query;
pub mod store;
pub mod supabase;

pub use memory::MemoryDatabase;
pub use query::{Condition, Query};
pub use store::{Database, DatabaseError};
pub use supabase::SupabaseClient;
