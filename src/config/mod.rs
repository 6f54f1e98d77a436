// Re-export all items from the submodules
mod carver_config;

pub use carver_config::{
    load_config,
    CarverConfig,
    CompressionKind,
    ExfilConfig,
    ExfilMode,
};
