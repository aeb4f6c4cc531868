//! Typed shape of every recognized configuration key (§6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub gateway: GatewayConfig,
    pub modules: ModuleEnables,
    pub ocr: OcrConfig,
    pub caption: CaptionConfig,
    pub face: FaceConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            gateway: GatewayConfig::default(),
            modules: ModuleEnables::default(),
            ocr: OcrConfig::default(),
            caption: CaptionConfig::default(),
            face: FaceConfig::default(),
            mail: MailConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub auth_header: String,
    pub auth_secret: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8088,
            auth_header: "Authorization".to_string(),
            auth_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub ingest_path: String,
    pub ingest_file_path: String,
    pub timeout_ms: u64,
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            ingest_path: "/v1/ingest".to_string(),
            ingest_file_path: "/v1/ingest/file".to_string(),
            timeout_ms: 30_000,
            bearer_token: None,
        }
    }
}

/// Per-collector module enables, distinct from the orchestrator's
/// per-run `ModuleEnables` (ocr/caption/entities) — this is the
/// service-wide switchboard that decides which collectors exist at all.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ModuleEnables {
    pub imessage_enabled: bool,
    pub ocr_enabled: bool,
    pub caption_enabled: bool,
    pub entity_enabled: bool,
    pub face_enabled: bool,
    pub fswatch_enabled: bool,
    pub mail_enabled: bool,
}

impl Default for ModuleEnables {
    fn default() -> Self {
        Self {
            imessage_enabled: false,
            ocr_enabled: false,
            caption_enabled: false,
            entity_enabled: false,
            face_enabled: false,
            fswatch_enabled: false,
            mail_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionLevel {
    Fast,
    Accurate,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    pub languages: Vec<String>,
    pub timeout_ms: u64,
    pub recognition_level: RecognitionLevel,
    pub include_layout: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            timeout_ms: 2_000,
            recognition_level: RecognitionLevel::Fast,
            include_layout: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CaptionBackendKind {
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub backend: CaptionBackendKind,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            backend: CaptionBackendKind::Ollama,
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "llava".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FaceConfig {
    pub min_face_size: u32,
    pub min_confidence: f32,
    pub include_landmarks: bool,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            min_face_size: 40,
            min_confidence: 0.5,
            include_landmarks: false,
        }
    }
}

/// `redact_pii` accepts either a bare bool (all categories on/off) or a
/// per-category object, matching §6's `bool | {emails, phones,
/// account_numbers, ssn}` union.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RedactPii {
    All(bool),
    Categories {
        #[serde(default)]
        emails: bool,
        #[serde(default)]
        phones: bool,
        #[serde(default)]
        account_numbers: bool,
        #[serde(default)]
        ssn: bool,
    },
}

impl Default for RedactPii {
    fn default() -> Self {
        RedactPii::All(false)
    }
}

impl RedactPii {
    pub fn redacts_emails(&self) -> bool {
        match self {
            RedactPii::All(b) => *b,
            RedactPii::Categories { emails, .. } => *emails,
        }
    }

    pub fn redacts_phones(&self) -> bool {
        match self {
            RedactPii::All(b) => *b,
            RedactPii::Categories { phones, .. } => *phones,
        }
    }

    pub fn redacts_account_numbers(&self) -> bool {
        match self {
            RedactPii::All(b) => *b,
            RedactPii::Categories { account_numbers, .. } => *account_numbers,
        }
    }

    pub fn redacts_ssn(&self) -> bool {
        match self {
            RedactPii::All(b) => *b,
            RedactPii::Categories { ssn, .. } => *ssn,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MailConfig {
    pub redact_pii: RedactPii,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self { redact_pii: RedactPii::default() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
    Logfmt,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, format: LogFormat::Text }
    }
}
