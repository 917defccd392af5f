pub mod bot_config;
pub mod paths;

pub use bot_config::{
    BotConfig, BridgeConfig, ChatConfig, ConfigError, IdentityConfig, MovementConfig,
    ReconnectConfig, ServerConfig, DEFAULT_HOST,
};
pub use paths::ProjectPaths;
