// HTTP text recognition service client and its wire format
use std::io::Cursor;

use image::{GrayImage, ImageFormat};
use serde::Deserialize;

use super::RecognizedText;
use crate::error::{Result, SheetError};

/// `{"results": [{"text", "confidence", "polygon"}]}`
#[derive(Debug, Deserialize)]
pub struct RecognitionResponse {
    #[serde(default)]
    pub results: Vec<RecognizedText>,
}

pub fn parse_response(body: &str) -> Result<Vec<RecognizedText>> {
    let response: RecognitionResponse =
        serde_json::from_str(body).map_err(|e| SheetError::Recognition(format!("malformed response: {e}")))?;
    Ok(response.results)
}

/// PNG bytes of the submitted region
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(feature = "remote-ocr")]
pub use client::HttpRecognizer;

#[cfg(feature = "remote-ocr")]
mod client {
    use std::time::Duration;

    use image::GrayImage;
    use tracing::debug;

    use super::{encode_png, parse_response};
    use crate::error::{Result, SheetError};
    use crate::ocr::{RecognizedText, TextRecognizer};

    /// Blocking client; the timeout is a transport setting, not a retry policy.
    pub struct HttpRecognizer {
        endpoint: String,
        client: reqwest::blocking::Client,
    }

    impl HttpRecognizer {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| SheetError::Recognition(e.to_string()))?;
            Ok(Self {
                endpoint: endpoint.into(),
                client,
            })
        }
    }

    impl TextRecognizer for HttpRecognizer {
        fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedText>> {
            let body = encode_png(image)?;
            debug!("posting {} bytes to {}", body.len(), self.endpoint);

            let response = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::CONTENT_TYPE, "image/png")
                .body(body)
                .send()
                .map_err(|e| SheetError::Recognition(e.to_string()))?;

            let status = response.status();
            let text = response.text().map_err(|e| SheetError::Recognition(e.to_string()))?;
            if !status.is_success() {
                return Err(SheetError::Recognition(format!("{} returned {}: {}", self.endpoint, status, text)));
            }
            parse_response(&text)
        }

        fn backend_name(&self) -> &str {
            "remote"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn parses_service_payload() {
        let body = r#"{"results":[
            {"text":"Eating","confidence":0.97,"polygon":[[10,5],[80,5],[80,25],[10,25]]},
            {"text":"A","confidence":0.61,"polygon":[[120,6],[132,6],[132,24],[120,24]]}
        ]}"#;
        let results = parse_response(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "Eating");
        assert_eq!(results[1].polygon[2], [132.0, 24.0]);
    }

    #[test]
    fn empty_or_broken_payloads() {
        assert!(parse_response("{}").unwrap().is_empty());
        assert!(matches!(parse_response("<html>"), Err(SheetError::Recognition(_))));
    }

    #[test]
    fn region_is_sent_as_png() {
        let png = encode_png(&GrayImage::from_pixel(8, 4, Luma([200]))).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (8, 4));
    }
}
