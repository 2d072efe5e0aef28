//! Face detection, swapping and enhancement models.
//!
//! The pipeline only sees the [`FaceDetector`], [`FaceSwapper`] and
//! [`FaceEnhancer`] traits. A [`ModelLoader`] builds all three once per job
//! and the resulting [`ModelSet`] is passed by reference to every frame.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Axis-aligned face box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub score: f32,
    /// Identity embedding consumed by the swapper.
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub landmarks: Vec<[f32; 2]>,
}

/// Largest face by bounding-box area. Ties keep the first one found.
pub fn largest_face(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    faces.iter().fold(None, |best: Option<&DetectedFace>, face| match best {
        Some(current) if current.bbox.area() >= face.bbox.area() => Some(current),
        _ => Some(face),
    })
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, VisionError>;
}

#[async_trait]
pub trait FaceSwapper: Send + Sync {
    /// Replace `target` in `image` with the identity of `reference` and paste
    /// the result back into the full frame.
    async fn swap(
        &self,
        image: &DynamicImage,
        target: &DetectedFace,
        reference: &DetectedFace,
    ) -> Result<DynamicImage, VisionError>;
}

#[async_trait]
pub trait FaceEnhancer: Send + Sync {
    async fn enhance(
        &self,
        image: &DynamicImage,
        face: &DetectedFace,
    ) -> Result<DynamicImage, VisionError>;
}

/// Models initialized for one job.
pub struct ModelSet {
    pub detector: Box<dyn FaceDetector>,
    pub swapper: Box<dyn FaceSwapper>,
    pub enhancer: Box<dyn FaceEnhancer>,
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<ModelSet, VisionError>;
}

/// Loads models hosted by an HTTP inference server.
///
/// `load` opens a session on the server so weights are resident before the
/// first frame; every later call reuses that session id.
pub struct RemoteModelLoader {
    http: Client,
    base_url: String,
}

impl RemoteModelLoader {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    models: [&'a str; 3],
}

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<DetectedFace>,
}

#[derive(Deserialize)]
struct ImageResponse {
    image: String,
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    async fn load(&self) -> Result<ModelSet, VisionError> {
        let url = format!("{}/v1/sessions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SessionRequest {
                models: ["detector", "swapper", "enhancer"],
            })
            .send()
            .await?
            .error_for_status()?;
        let session: SessionResponse = response.json().await?;

        tracing::info!(session_id = %session.session_id, "Face models loaded");

        let session = Arc::new(RemoteSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            session_id: session.session_id,
        });

        Ok(ModelSet {
            detector: Box::new(RemoteDetector(session.clone())),
            swapper: Box::new(RemoteSwapper(session.clone())),
            enhancer: Box::new(RemoteEnhancer(session)),
        })
    }
}

struct RemoteSession {
    http: Client,
    base_url: String,
    session_id: String,
}

impl RemoteSession {
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<T, VisionError> {
        let url = format!("{}/v1/sessions/{}/{operation}", self.base_url, self.session_id);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

struct RemoteDetector(Arc<RemoteSession>);
struct RemoteSwapper(Arc<RemoteSession>);
struct RemoteEnhancer(Arc<RemoteSession>);

#[async_trait]
impl FaceDetector for RemoteDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, VisionError> {
        let body = serde_json::json!({ "image": encode_png(image)? });
        let response: DetectResponse = self.0.call("detect", body).await?;
        Ok(response.faces)
    }
}

#[async_trait]
impl FaceSwapper for RemoteSwapper {
    async fn swap(
        &self,
        image: &DynamicImage,
        target: &DetectedFace,
        reference: &DetectedFace,
    ) -> Result<DynamicImage, VisionError> {
        let body = serde_json::json!({
            "image": encode_png(image)?,
            "target": target,
            "source": reference,
            "paste_back": true,
        });
        let response: ImageResponse = self.0.call("swap", body).await?;
        decode_png(&response.image)
    }
}

#[async_trait]
impl FaceEnhancer for RemoteEnhancer {
    async fn enhance(
        &self,
        image: &DynamicImage,
        face: &DetectedFace,
    ) -> Result<DynamicImage, VisionError> {
        let body = serde_json::json!({
            "image": encode_png(image)?,
            "face": face,
            "paste_back": true,
        });
        let response: ImageResponse = self.0.call("enhance", body).await?;
        decode_png(&response.image)
    }
}

fn encode_png(image: &DynamicImage) -> Result<String, VisionError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(VisionError::Encode)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}

fn decode_png(encoded: &str) -> Result<DynamicImage, VisionError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| VisionError::Protocol(format!("image payload is not base64: {e}")))?;
    image::load_from_memory(&bytes).map_err(VisionError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Model server request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode model output: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode model input: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Unexpected model server response: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { x1, y1, x2, y2 },
            score: 0.9,
            embedding: Vec::new(),
            landmarks: Vec::new(),
        }
    }

    #[test]
    fn picks_largest_area() {
        let faces = vec![face(0.0, 0.0, 10.0, 10.0), face(0.0, 0.0, 30.0, 20.0), face(5.0, 5.0, 20.0, 20.0)];
        assert_eq!(largest_face(&faces), Some(&faces[1]));
    }

    #[test]
    fn ties_keep_first_found() {
        let faces = vec![face(0.0, 0.0, 10.0, 10.0), face(50.0, 50.0, 60.0, 60.0)];
        let chosen = largest_face(&faces).unwrap();
        assert_eq!(chosen.bbox.x1, 0.0);
    }

    #[test]
    fn no_faces_no_choice() {
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn inverted_box_has_zero_area() {
        assert_eq!(face(10.0, 10.0, 5.0, 20.0).bbox.area(), 0.0);
    }

    #[test]
    fn png_payloads_survive_the_wire_format() {
        let image = DynamicImage::new_rgb8(4, 3);
        let decoded = decode_png(&encode_png(&image).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn detection_response_tolerates_missing_landmarks() {
        let response: DetectResponse = serde_json::from_str(
            r#"{"faces": [{"bbox": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}, "score": 0.8}]}"#,
        )
        .unwrap();
        assert_eq!(response.faces.len(), 1);
        assert!(response.faces[0].landmarks.is_empty());
    }
}
