//! A wiremock responder that honors HTTP byte ranges.

use std::sync::{Arc, Mutex};

use wiremock::{Request, Respond, ResponseTemplate};

/// Serves a fixed body with `Range` support, recording every requested
/// range, and optionally failing specific range starts.
pub struct RangeResponder {
    body: Vec<u8>,
    requested: Arc<Mutex<Vec<String>>>,
    fail_range_starts: Vec<u64>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            requested: Arc::new(Mutex::new(Vec::new())),
            fail_range_starts: Vec::new(),
        }
    }

    /// Responds 500 to any range request starting at one of these offsets.
    pub fn failing_starts(mut self, starts: Vec<u64>) -> Self {
        self.fail_range_starts = starts;
        self
    }

    /// Shared log of `Range` header values seen.
    pub fn requested(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.requested)
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);

        let Some(range) = range else {
            return ResponseTemplate::new(200)
                .insert_header("Accept-Ranges", "bytes")
                .insert_header("Content-Type", "application/octet-stream")
                .set_body_bytes(self.body.clone());
        };

        self.requested
            .lock()
            .expect("range log lock")
            .push(range.clone());

        let Some((start, end)) = parse_range(&range, self.body.len() as u64) else {
            return ResponseTemplate::new(416);
        };

        if self.fail_range_starts.contains(&start) {
            return ResponseTemplate::new(500);
        }

        let slice = self.body[start as usize..=(end as usize)].to_vec();
        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
            )
            .insert_header("Accept-Ranges", "bytes")
            .insert_header("Content-Type", "application/octet-stream")
            .set_body_bytes(slice)
    }
}

/// Parses `bytes=a-b` / `bytes=a-` against a body length.
fn parse_range(value: &str, len: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        len - 1
    } else {
        end.parse::<u64>().ok()?.min(len - 1)
    };
    (start <= end).then_some((start, end))
}
