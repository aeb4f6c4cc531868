//! Produces text, bounding boxes, and layout regions from image bytes
//! (component C5). The actual recognition engine is a pluggable backend;
//! this module owns the normalized output shape, timeout, and bbox
//! coordinate convention.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("ocr backend error: {0}")]
    Backend(String),

    #[error("ocr call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionLevel {
    Fast,
    Accurate,
}

impl Default for RecognitionLevel {
    fn default() -> Self {
        RecognitionLevel::Fast
    }
}

/// Normalized `[x, y, w, h]` in top-left origin, regardless of whether the
/// underlying backend reports boxes from the bottom-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    /// Converts a bottom-left-origin box (image height `h_img`) to top-left.
    pub fn from_bottom_left(x: f32, y_from_bottom: f32, w: f32, h: f32, h_img: f32) -> Self {
        BoundingBox {
            x,
            y: h_img - y_from_bottom - h,
            w,
            h,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OcrBox {
    pub text: String,
    pub bbox: BoundingBox,
    pub level: String,
    pub confidence: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OcrRegion {
    pub label: String,
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OcrOutput {
    pub ocr_text: String,
    pub ocr_boxes: Vec<OcrBox>,
    #[serde(default)]
    pub regions: Option<Vec<OcrRegion>>,
    #[serde(default)]
    pub detected_languages: Option<Vec<String>>,
    pub recognition_level: RecognitionLevel,
    pub lang: String,
    pub timings_ms: u64,
}

#[derive(Clone, Debug)]
pub struct OcrRequest {
    pub image_bytes: Vec<u8>,
    pub recognition_level: RecognitionLevel,
    pub lang: String,
    pub timeout: Duration,
}

impl OcrRequest {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            recognition_level: RecognitionLevel::default(),
            lang: "en".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn recognize(&self, request: &OcrRequest) -> Result<OcrOutput, OcrError>;
}

/// Wraps any `OcrProvider` so every call is bounded by `request.timeout`
/// (default 2s per §4.4), independent of what the backend itself enforces.
pub struct TimeoutEnforcingProvider<P> {
    inner: P,
}

impl<P: OcrProvider> TimeoutEnforcingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: OcrProvider> OcrProvider for TimeoutEnforcingProvider<P> {
    async fn recognize(&self, request: &OcrRequest) -> Result<OcrOutput, OcrError> {
        match tokio::time::timeout(request.timeout, self.inner.recognize(request)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout(request.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct SlowProvider {
        delay: Duration,
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl OcrProvider for SlowProvider {
        async fn recognize(&self, _request: &OcrRequest) -> Result<OcrOutput, OcrError> {
            self.called.store(true, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(OcrOutput {
                ocr_text: "hello".to_string(),
                ocr_boxes: vec![],
                regions: None,
                detected_languages: None,
                recognition_level: RecognitionLevel::Fast,
                lang: "en".to_string(),
                timings_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn enforces_timeout_when_backend_is_slow() {
        let called = Arc::new(AtomicBool::new(false));
        let provider = TimeoutEnforcingProvider::new(SlowProvider {
            delay: Duration::from_millis(50),
            called: called.clone(),
        });
        let mut request = OcrRequest::new(vec![]);
        request.timeout = Duration::from_millis(5);
        let err = provider.recognize(&request).await.unwrap_err();
        assert!(matches!(err, OcrError::Timeout(_)));
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn bottom_left_box_converts_to_top_left() {
        let bbox = BoundingBox::from_bottom_left(10.0, 5.0, 20.0, 8.0, 100.0);
        assert_eq!(bbox.y, 100.0 - 5.0 - 8.0);
    }

    #[test]
    fn recognition_level_defaults_to_fast() {
        assert_eq!(RecognitionLevel::default(), RecognitionLevel::Fast);
    }
}
