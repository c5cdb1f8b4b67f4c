pub mod memory;
pub mod postgrest;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use postgrest::SupabaseStore;
pub use traits::{select_as, RemoteStore};
pub use types::{AccessToken, Match, Table, ESTATE_COLUMNS};
