// Text decoding for invoice documents, logs and ledgers

use std::borrow::Cow;

use encoding_rs::{Encoding, WINDOWS_1252};
use sisxml_recon::source::TextDecoder;

/// How far into a document to look for an XML declaration.
const DECLARATION_WINDOW: usize = 256;

/// BOM, then UTF-8, then the charset an XML declaration names, then
/// Windows-1252 (what Excel exports on pt-BR machines).
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingDecoder;

impl TextDecoder for SniffingDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            return encoding.decode_without_bom_handling(&bytes[bom_len..]).0;
        }

        match std::str::from_utf8(bytes) {
            Ok(text) => return Cow::Borrowed(text),
            // truncated prefix: only the last character is cut
            Err(e) if e.error_len().is_none() && bytes.len() - e.valid_up_to() < 4 => {
                if let Ok(text) = std::str::from_utf8(&bytes[..e.valid_up_to()]) {
                    return Cow::Borrowed(text);
                }
            }
            Err(_) => {}
        }

        let encoding = declared_encoding(bytes).unwrap_or(WINDOWS_1252);
        encoding.decode_without_bom_handling(bytes).0
    }
}

/// `<?xml version="1.0" encoding="ISO-8859-1"?>` → ISO-8859-1.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = &head[..end];
    let at = decl.windows(8).position(|w| w == b"encoding")?;
    let rest = &decl[at + 8..];
    let open = rest.iter().position(|&b| b == b'"' || b == b'\'')?;
    let quote = rest[open];
    let label = &rest[open + 1..];
    let close = label.iter().position(|&b| b == quote)?;
    Encoding::for_label(&label[..close])
}
