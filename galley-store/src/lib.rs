pub mod app_config;
pub mod changes;
pub mod inventory_client;
pub mod memory_repo;

pub use app_config::Config;
pub use changes::{FrameDecoder, FrameError};
pub use inventory_client::HttpInventoryClient;
pub use memory_repo::MemoryInventoryStore;
