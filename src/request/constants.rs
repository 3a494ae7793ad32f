//! Constants for the request module (timeouts, header presets).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large bodies).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Browser preset retry delays.
pub const BROWSER_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(300),
    Duration::from_millis(800),
    Duration::from_millis(1500),
];

/// `Accept` for HTML pages.
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// `Accept` for JSON APIs.
pub const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// `Accept` for XML documents.
pub const ACCEPT_XML: &str = "application/xml, text/xml;q=0.9, */*;q=0.8";

/// `Accept` for anything.
pub const ACCEPT_ANY: &str = "*/*";

/// `Accept-Language` preferring English.
pub const ACCEPT_LANGUAGE_EN: &str = "en-US,en;q=0.9";

/// `Accept-Language` preferring Chinese.
pub const ACCEPT_LANGUAGE_ZH: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Encodings offered by default; all are decoded by [`Decompress`](crate::response::Decompress).
pub const DEFAULT_ENCODINGS: &[&str] = &["gzip", "deflate", "br"];

/// Every encoding [`Decompress`](crate::response::Decompress) understands.
pub const ALL_ENCODINGS: &[&str] = &["gzip", "deflate", "br", "zstd", "snappy", "s2"];
