use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::ledger::{AllocationReceipt, TxRef};
use crate::storage::{cid_string, Cid};

/// Number of identifier characters used in synthesized names
const NAME_PREFIX_LEN: usize = 8;

/// What a piece of content turned out to be.
///
/// On the wire this is a single string: `"directory"`, `"unknown"`,
///  or the MIME type of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    File(Mime),
    Directory,
    Unknown,
}

impl ContentKind {
    /// A file we could read but not identify
    pub fn binary() -> Self {
        ContentKind::File(mime::APPLICATION_OCTET_STREAM)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ContentKind::Directory)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::File(mime) => f.write_str(mime.as_ref()),
            ContentKind::Directory => f.write_str("directory"),
            ContentKind::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = mime::FromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(ContentKind::Directory),
            "unknown" => Ok(ContentKind::Unknown),
            other => Ok(ContentKind::File(other.parse()?)),
        }
    }
}

impl Serialize for ContentKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Deterministic name for content that arrived without one,
///  e.g. `File-QmT78zSu`
pub fn synthesize_name(identifier: &Cid, kind: &ContentKind) -> String {
    let label = match kind {
        ContentKind::Directory => "Dir",
        ContentKind::File(_) => "File",
        ContentKind::Unknown => "Unknown",
    };
    let id = identifier.to_string();
    let prefix: String = id.chars().take(NAME_PREFIX_LEN).collect();
    format!("{}-{}", label, prefix)
}

/// Public link to `identifier` under a gateway base such as
///  `http://127.0.0.1:8080/ipfs`
pub fn accessible_at(gateway_base: &Url, identifier: &Cid) -> String {
    format!(
        "{}/{}",
        gateway_base.as_str().trim_end_matches('/'),
        identifier
    )
}

/// A persisted upload: content pinned on the network and paid for on
///  the ledger. Content addressing makes this immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(with = "cid_string")]
    pub identifier: Cid,
    pub display_name: String,
    pub size_bytes: u64,
    pub kind: ContentKind,
    pub created_at: DateTime<Utc>,
    pub payment_tx: TxRef,
    pub allocation_tx: TxRef,
    pub receipt: AllocationReceipt,
}

impl FileRecord {
    pub fn accessible_at(&self, gateway_base: &Url) -> String {
        accessible_at(gateway_base, &self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::parse_identifier;

    const HELLO_CID: &str = "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o";

    #[test]
    fn test_kind_wire_format() {
        let kinds = [
            (ContentKind::Directory, "\"directory\""),
            (ContentKind::Unknown, "\"unknown\""),
            (ContentKind::File(mime::IMAGE_PNG), "\"image/png\""),
            (ContentKind::binary(), "\"application/octet-stream\""),
        ];
        for (kind, json) in kinds {
            assert_eq!(serde_json::to_string(&kind).unwrap(), json);
            let back: ContentKind = serde_json::from_str(json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_kind_rejects_garbage() {
        assert!(serde_json::from_str::<ContentKind>("\"not a mime\"").is_err());
    }

    #[test]
    fn test_synthesize_name() {
        let cid = parse_identifier(HELLO_CID).unwrap();
        assert_eq!(synthesize_name(&cid, &ContentKind::Directory), "Dir-QmT78zSu");
        assert_eq!(synthesize_name(&cid, &ContentKind::binary()), "File-QmT78zSu");
        assert_eq!(synthesize_name(&cid, &ContentKind::Unknown), "Unknown-QmT78zSu");
    }

    #[test]
    fn test_accessible_at_handles_trailing_slash() {
        let cid = parse_identifier(HELLO_CID).unwrap();
        let with = Url::parse("http://127.0.0.1:8080/ipfs/").unwrap();
        let without = Url::parse("http://127.0.0.1:8080/ipfs").unwrap();
        let expected = format!("http://127.0.0.1:8080/ipfs/{}", HELLO_CID);
        assert_eq!(accessible_at(&with, &cid), expected);
        assert_eq!(accessible_at(&without, &cid), expected);
    }
}
