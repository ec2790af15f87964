//! The retrieval request model.
//!
//! The gateway parses each inbound request into one immutable
//! [`RetrievalRequest`] at the top of the pipeline; every later stage
//! (source selection, fetchers, verification) reads from it and nothing
//! mutates it.

use crate::identifier::ContentId;

/// Requested representation of the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Archive container stream (`application/vnd.ipld.car`).
    Car,
    /// A single raw block (`application/vnd.ipld.raw`).
    Raw,
    /// Whole object, origin-determined encoding.
    Default,
}

impl ResponseFormat {
    /// Resolve the format from the explicit query parameter first, then the
    /// content-negotiation header, else the default.
    ///
    /// The `Accept` header may carry a comma-separated list; the first
    /// recognized entry wins. Unrecognized formats fall back to default,
    /// matching upstream gateway behavior.
    pub fn resolve(format_param: Option<&str>, accept: Option<&str>) -> Self {
        match format_param {
            Some("car") => return ResponseFormat::Car,
            Some("raw") => return ResponseFormat::Raw,
            Some(_) => return ResponseFormat::Default,
            None => {}
        }
        if let Some(accept) = accept {
            for key in accept.split(',') {
                let key = key.trim();
                if key.starts_with("application/vnd.ipld.car") {
                    return ResponseFormat::Car;
                }
                if key.starts_with("application/vnd.ipld.raw") {
                    return ResponseFormat::Raw;
                }
            }
        }
        ResponseFormat::Default
    }

    /// Content type for responses assembled locally (upstream passthrough
    /// responses carry the upstream's own type).
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseFormat::Car => "application/vnd.ipld.car",
            ResponseFormat::Raw => "application/vnd.ipld.raw",
            ResponseFormat::Default => "application/octet-stream",
        }
    }

    /// The `format` query value understood by upstream gateways.
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            ResponseFormat::Car => Some("car"),
            ResponseFormat::Raw => Some("raw"),
            ResponseFormat::Default => None,
        }
    }
}

/// Traversal depth requested by the client, translated by the retrieval
/// service fetcher into its scope vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagDepth {
    /// Just the root block.
    Block,
    /// The root entity (a full file).
    File,
    /// The entire DAG under the root.
    All,
}

impl DagDepth {
    /// Parse the `depth` query parameter. Unknown values are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(DagDepth::Block),
            "1" => Some(DagDepth::File),
            "all" => Some(DagDepth::All),
            _ => None,
        }
    }
}

/// A single inclusive byte range, `bytes=start-end`.
///
/// Only the fixed local test fixture is served by range at this layer, so a
/// single fully-specified range is all that is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parse a `Range` header value. Suffix and open-ended ranges are not
    /// served at this layer and yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        let start = start.parse().ok()?;
        let end = end.parse().ok()?;
        if end < start {
            return None;
        }
        Some(ByteRange { start, end })
    }
}

/// Everything downstream stages need to know about one inbound request,
/// constructed once by the gateway parser.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Normalized content identifier from the path.
    pub id: ContentId,
    /// Sub-path below the root, when the request is not for the whole object.
    pub sub_path: Option<String>,
    /// Requested representation.
    pub format: ResponseFormat,
    /// Byte range, honored only for the local test fixture.
    pub range: Option<ByteRange>,
    /// `filename` query parameter (Content-Disposition override), forwarded
    /// upstream untouched.
    pub filename: Option<String>,
    /// Traversal depth parameter, translated per upstream.
    pub depth: Option<DagDepth>,
    /// `Cache-Control` request header, forwarded on the upstream allow-list.
    pub cache_control: Option<String>,
    /// `x-if-none-match` workaround header, forwarded as `if-none-match`.
    pub if_none_match: Option<String>,
    /// Correlation token for peer-tier solicitations.
    pub transfer_id: String,
}

impl RetrievalRequest {
    /// Whether this asks for the whole object rather than a sub-path.
    pub fn is_whole_object(&self) -> bool {
        self.sub_path.is_none()
    }

    /// The `/ipfs/...` path this request addresses, used when translating
    /// to upstream URLs.
    pub fn upstream_path(&self) -> String {
        match &self.sub_path {
            Some(p) => format!("/ipfs/{}/{}", self.id.canonical(), p),
            None => format!("/ipfs/{}", self.id.canonical()),
        }
    }
}
