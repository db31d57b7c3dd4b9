mod settings;

pub use settings::{
    ListenerConfig, LogFormat, LoggingConfig, OtelConfig, Settings, StompConfig,
};
