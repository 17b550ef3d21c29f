//! Remote detection service client.
//!
//! One round is one `POST` of a multipart form carrying a single JPEG part named
//! `file`. The service answers with
//! `{"detections": [{"class", "confidence", "x1", "y1", "x2", "y2"}, ...]}`
//! or with `{"error": "..."}` when it could not process the frame.
//!
//! Every call is bounded by the agent timeout; a hung service surfaces as
//! `DetectionError::Timeout` rather than an ever-growing backlog.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::DetectionError;
use crate::frame::{FrameSample, DEFAULT_JPEG_QUALITY};

const MULTIPART_BOUNDARY: &str = "----ppe-overlay-frame-boundary";

/// Configuration for the remote detection service.
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Endpoint URL (e.g., "http://localhost:8000/detect/").
    pub url: String,
    /// Upper bound on one round trip, connect included.
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/detect/".to_string(),
            timeout: Duration::from_millis(2000),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

pub struct HttpBackend {
    config: HttpBackendConfig,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse detection service url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported detection service scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if config.timeout.is_zero() {
            return Err(anyhow!("detection timeout must be greater than zero"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout(config.timeout)
            .build();
        Ok(Self { config, agent })
    }

    fn post_frame(&self, jpeg: &[u8]) -> Result<String, DetectionError> {
        let body = multipart_body(jpeg);
        let response = self
            .agent
            .post(&self.config.url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .send_bytes(&body)
            .map_err(|err| self.map_ureq_error(err))?;

        response.into_string().map_err(|err| {
            if is_timeout_io(&err) {
                DetectionError::Timeout(self.config.timeout)
            } else {
                DetectionError::Network(format!("failed to read response body: {err}"))
            }
        })
    }

    fn map_ureq_error(&self, err: ureq::Error) -> DetectionError {
        match err {
            ureq::Error::Status(code, response) => {
                // Surface the service's own reason when it sent one.
                let reason = response
                    .into_string()
                    .ok()
                    .and_then(|body| serde_json::from_str::<WireResponse>(&body).ok())
                    .and_then(|wire| wire.error);
                match reason {
                    Some(reason) => DetectionError::Network(format!("HTTP {code}: {reason}")),
                    None => DetectionError::Network(format!("HTTP {code}")),
                }
            }
            ureq::Error::Transport(transport) => {
                if transport_is_timeout(&transport) {
                    DetectionError::Timeout(self.config.timeout)
                } else {
                    DetectionError::Network(transport.to_string())
                }
            }
        }
    }
}

impl DetectorBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, frame: &FrameSample) -> Result<Vec<Detection>, DetectionError> {
        let jpeg = frame
            .encode_jpeg(self.config.jpeg_quality)
            .map_err(|err| DetectionError::Network(format!("frame encode failed: {err:#}")))?;
        let body = self.post_frame(&jpeg)?;
        parse_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    detections: Option<Vec<WireDetection>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(alias = "label")]
    class: Option<String>,
    confidence: Option<f64>,
    x1: Option<f64>,
    y1: Option<f64>,
    x2: Option<f64>,
    y2: Option<f64>,
}

/// Normalise a service response body into detections.
pub fn parse_response(body: &str) -> Result<Vec<Detection>, DetectionError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|err| DetectionError::MalformedResponse(format!("invalid JSON: {err}")))?;

    if let Some(error) = wire.error {
        return Err(DetectionError::Service(error));
    }
    let detections = wire
        .detections
        .ok_or_else(|| DetectionError::MalformedResponse("missing 'detections' field".into()))?;

    detections
        .into_iter()
        .enumerate()
        .map(|(index, det)| {
            let missing = |field: &str| {
                DetectionError::MalformedResponse(format!("detection #{index} missing '{field}'"))
            };
            let label = det.class.ok_or_else(|| missing("class"))?;
            let confidence = det.confidence.ok_or_else(|| missing("confidence"))?;
            let bbox = BoundingBox::new(
                det.x1.ok_or_else(|| missing("x1"))? as f32,
                det.y1.ok_or_else(|| missing("y1"))? as f32,
                det.x2.ok_or_else(|| missing("x2"))? as f32,
                det.y2.ok_or_else(|| missing("y2"))? as f32,
            )?;
            Detection::new(label, confidence as f32, bbox)
        })
        .collect()
}

fn multipart_body(jpeg: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(jpeg.len() + 256);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"frame.jpg\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(jpeg);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

fn is_timeout_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn transport_is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = transport.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_timeout_io(io_err) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detections_in_order() {
        let body = r#"{"detections": [
            {"class": "NO-Hardhat", "confidence": 0.9, "x1": 10, "y1": 10, "x2": 50, "y2": 50},
            {"label": "Safety Vest", "confidence": 0.4, "x1": 60, "y1": 60, "x2": 100, "y2": 100}
        ]}"#;
        let detections = parse_response(body).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "NO-Hardhat");
        assert_eq!(detections[0].bbox, BoundingBox::new(10.0, 10.0, 50.0, 50.0).unwrap());
        assert_eq!(detections[1].label, "Safety Vest");
    }

    #[test]
    fn service_error_field_is_surfaced() {
        let err = parse_response(r#"{"error": "model not loaded"}"#).unwrap_err();
        assert_eq!(err, DetectionError::Service("model not loaded".into()));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for body in [
            "not json",
            r#"{}"#,
            r#"{"detections": [{"class": "Person", "x1": 0, "y1": 0, "x2": 5, "y2": 5}]}"#,
            r#"{"detections": [{"class": "Person", "confidence": 0.8, "x1": 9, "y1": 0, "x2": 5, "y2": 5}]}"#,
            r#"{"detections": [{"class": "Person", "confidence": 3.0, "x1": 0, "y1": 0, "x2": 5, "y2": 5}]}"#,
        ] {
            assert!(
                matches!(parse_response(body), Err(DetectionError::MalformedResponse(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_response(r#"{"detections": []}"#).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_http_endpoints() {
        let config = HttpBackendConfig {
            url: "ftp://example.com/detect".into(),
            ..HttpBackendConfig::default()
        };
        assert!(HttpBackend::new(config).is_err());
    }

    #[test]
    fn multipart_body_wraps_jpeg_in_file_part() {
        let body = multipart_body(b"JPEG");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with(&format!("--{MULTIPART_BOUNDARY}\r\n")));
        assert!(text.contains("name=\"file\"; filename=\"frame.jpg\""));
        assert!(text.contains("\r\n\r\nJPEG\r\n"));
        assert!(text.ends_with(&format!("--{MULTIPART_BOUNDARY}--\r\n")));
    }
}
