//! CRLF to LF rewriting for relayed output

/// Rewrites every `\r\n` to `\n` across a stream of chunks
///
/// A `\r` ending one chunk is held until the next chunk shows whether a `\n`
/// follows it. All other bytes pass through untouched.
#[derive(Debug, Default)]
pub struct CrlfNormalizer {
    pending_cr: bool,
}

impl CrlfNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the next chunk
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + 1);
        let mut bytes = chunk.iter().copied().peekable();

        if std::mem::take(&mut self.pending_cr) && bytes.peek() != Some(&b'\n') {
            out.push(b'\r');
        }

        while let Some(byte) = bytes.next() {
            if byte == b'\r' {
                match bytes.peek() {
                    Some(b'\n') => continue,
                    Some(_) => out.push(b'\r'),
                    None => self.pending_cr = true,
                }
            } else {
                out.push(byte);
            }
        }

        out
    }

    /// Bytes still held back once the stream has ended
    pub fn finish(&mut self) -> Vec<u8> {
        if std::mem::take(&mut self.pending_cr) {
            vec![b'\r']
        } else {
            Vec::new()
        }
    }
}

/// Normalize a complete buffer in one go
pub fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut normalizer = CrlfNormalizer::new();
    let mut out = normalizer.push(data);
    out.extend(normalizer.finish());
    out
}
