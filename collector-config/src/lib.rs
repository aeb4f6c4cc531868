pub mod error;
pub mod loader;
pub mod models;

pub use error::ConfigError;
pub use loader::{parse_bool, parse_bool_var};
pub use models::{
    CaptionBackendKind, CaptionConfig, Config, FaceConfig, GatewayConfig, LogFormat, LogLevel,
    LoggingConfig, MailConfig, ModuleEnables, OcrConfig, RecognitionLevel, RedactPii, ServiceConfig,
};
