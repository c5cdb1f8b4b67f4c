pub mod events;
pub mod gotrue;
pub mod memory;
pub mod observer;
pub mod traits;

pub use gotrue::SupabaseAuth;
pub use memory::MemoryAuth;
pub use observer::SessionObserver;
pub use traits::AuthClient;
