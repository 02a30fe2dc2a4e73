use mime::Mime;

/// Leading bytes that identify a file format.
///  `magic` must appear at `offset` within the content.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub offset: usize,
    pub magic: &'static [u8],
    pub mime: &'static str,
}

impl Signature {
    const fn new(offset: usize, magic: &'static [u8], mime: &'static str) -> Self {
        Self {
            offset,
            magic,
            mime,
        }
    }

    pub fn matches(&self, prefix: &[u8]) -> bool {
        prefix
            .get(self.offset..self.offset + self.magic.len())
            .is_some_and(|window| window == self.magic)
    }
}

/// Known formats, checked in order. Add new formats here.
pub const SIGNATURES: &[Signature] = &[
    Signature::new(0, &[0xFF, 0xD8, 0xFF], "image/jpeg"),
    Signature::new(0, &[0x89, b'P', b'N', b'G'], "image/png"),
    Signature::new(0, b"GIF8", "image/gif"),
    Signature::new(0, b"%PDF", "application/pdf"),
    Signature::new(8, b"WEBP", "image/webp"),
    Signature::new(4, b"ftyp", "video/mp4"),
    Signature::new(0, &[0x1F, 0x8B], "application/gzip"),
    Signature::new(0, &[b'P', b'K', 0x03, 0x04], "application/zip"),
    Signature::new(0, &[0x00, b'a', b's', b'm'], "application/wasm"),
];

/// Bytes that cover every signature in the table
pub const SNIFF_LENGTH: u64 = 16;

/// Identify `prefix` against [`SIGNATURES`]
pub fn sniff(prefix: &[u8]) -> Option<Mime> {
    SIGNATURES
        .iter()
        .find(|signature| signature.matches(prefix))
        .and_then(|signature| signature.mime.parse().ok())
}

/// Ways of finding out what an identifier points at, tried in order
///  until one gives an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Non-empty child listing means a directory
    Directory,
    /// Readable prefix means a file; the signature table names the type
    MagicNumber,
}

pub const DEFAULT_PROBES: &[Probe] = &[Probe::Directory, Probe::MagicNumber];
