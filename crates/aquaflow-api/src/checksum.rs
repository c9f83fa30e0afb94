//! Request signing for the AquaFlow Connect portal.
//!
//! The portal validates every non-login request with a custom integrity
//! value computed over the attribute values of the outgoing document:
//!
//! 1. Trim the input; an empty string contributes 0.
//! 2. Re-pack the UTF-8 byte stream into 5-bit chunks
//!    (`ceil(total_bits / 5)` of them, zero-padded past the buffer end).
//! 3. Map each chunk through a two-secret substitution alphabet and sum
//!    the selected alphabet bytes into a running accumulator.
//! 4. Render the accumulator as uppercase hex and splice it into the
//!    document as a `<cs v="..."/>` element.
//!
//! This is not a cryptographic digest; it only has to match what the
//! portal computes on its side.

use tracing::trace;

/// The substitution alphabet (`secret A`). Chunk values index into it.
pub const SECRET_ALPHABET: &str = "L8KZAW9EDQP3MV5YJT2RB7CXF4GH6NSUP";

/// The rotation key (`secret B`). Cycled per chunk to offset the index.
pub const SECRET_KEY: &str = "KHGKBD83ASLWX7PQJM56T";

/// Compute the checksum contribution of a single string under the given
/// secrets.
///
/// Deterministic: the same `(alphabet, key, value)` always yields the same
/// integer. Whitespace-only input contributes 0.
pub fn compute_over(alphabet: &str, key: &str, value: &str) -> u64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let bytes = trimmed.as_bytes();
    let alpha = alphabet.as_bytes();
    let key_bytes = key.as_bytes();
    if alpha.len() < 2 || key_bytes.is_empty() {
        return 0;
    }

    let total_bits = bytes.len() * 8;
    let chunk_count = total_bits.div_ceil(5);

    let mut acc = 0u64;
    for i in 0..chunk_count {
        let bit = i * 5;
        let idx = bit / 8;
        let shift = bit % 8;
        // The 5-bit window may span two adjacent bytes; reads past the end
        // of the buffer are zero-padded.
        let hi = u16::from(bytes.get(idx).copied().unwrap_or(0));
        let lo = u16::from(bytes.get(idx + 1).copied().unwrap_or(0));
        let chunk = usize::from((((hi << 8) | lo) >> (11 - shift)) & 0x1F);

        let key_ch = key_bytes[i % key_bytes.len()];
        // A key character absent from the alphabet offsets by 0. That is a
        // safeguard, not an error.
        let offset = alpha.iter().position(|&a| a == key_ch).unwrap_or(0);

        let mut pos = chunk + offset;
        while pos >= alpha.len() {
            pos -= alpha.len() - 1;
        }
        acc += u64::from(alpha[pos]);
    }

    trace!(len = bytes.len(), chunks = chunk_count, acc, "checksum contribution");
    acc
}

/// Per-request checksum accumulator.
///
/// Allocated fresh for every signing call and never shared, so concurrent
/// request signing cannot interleave accumulator state.
#[derive(Debug, Default)]
pub struct ChecksumBuilder {
    acc: u64,
}

impl ChecksumBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one string into the accumulator under the portal secrets.
    pub fn accumulate(&mut self, value: &str) {
        self.acc += compute_over(SECRET_ALPHABET, SECRET_KEY, value);
    }

    /// The raw accumulator value.
    pub fn value(&self) -> u64 {
        self.acc
    }

    /// Render the digest as uppercase hex with no fixed width.
    pub fn digest_hex(&self) -> String {
        format!("{:X}", self.acc)
    }
}

/// Parse a digest previously rendered by [`ChecksumBuilder::digest_hex`].
pub fn digest_from_hex(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex, 16).ok()
}

/// Sign an outgoing XML document.
///
/// Walks the document depth-first and feeds every attribute value except
/// attributes named `n` (the portal excludes them), then splices
/// `<cs v="DIGEST"/>` in front of the closing root tag.
///
/// An unparsable document still receives a signature element; the
/// accumulator simply never advances. The portal's own validation was
/// built against this client behavior, so it must not become an error.
pub fn sign_document(xml: &str) -> String {
    let mut builder = ChecksumBuilder::new();
    if let Ok(doc) = roxmltree::Document::parse(xml) {
        for node in doc.descendants().filter(roxmltree::Node::is_element) {
            for attr in node.attributes() {
                if attr.name() != "n" {
                    builder.accumulate(attr.value());
                }
            }
        }
    }

    let digest = builder.digest_hex();
    match xml.rfind("</") {
        Some(idx) => format!("{}<cs v=\"{digest}\"/>{}", &xml[..idx], &xml[idx..]),
        None => format!("{xml}<cs v=\"{digest}\"/>"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_contribute_zero() {
        assert_eq!(compute_over(SECRET_ALPHABET, SECRET_KEY, ""), 0);
        assert_eq!(compute_over(SECRET_ALPHABET, SECRET_KEY, "   \t"), 0);
    }

    #[test]
    fn deterministic_for_same_input() {
        let a = compute_over(SECRET_ALPHABET, SECRET_KEY, "getPRS=39");
        let b = compute_over(SECRET_ALPHABET, SECRET_KEY, "getPRS=39");
        assert_eq!(a, b);
        assert_ne!(a, 0);
    }

    #[test]
    fn leading_and_trailing_whitespace_ignored() {
        assert_eq!(
            compute_over(SECRET_ALPHABET, SECRET_KEY, "  abc  "),
            compute_over(SECRET_ALPHABET, SECRET_KEY, "abc"),
        );
    }

    #[test]
    fn digest_hex_round_trips() {
        let mut builder = ChecksumBuilder::new();
        builder.accumulate("S1");
        builder.accumulate("serial-0042");
        let hex = builder.digest_hex();
        assert_eq!(digest_from_hex(&hex), Some(builder.value()));
    }

    #[test]
    fn digest_hex_is_uppercase_without_padding() {
        let builder = ChecksumBuilder { acc: 0xABC };
        assert_eq!(builder.digest_hex(), "ABC");
    }

    #[test]
    fn signing_excludes_attributes_named_n() {
        let a = sign_document(r#"<sc><us ug="S1"/><c n="first" v="1"/></sc>"#);
        let b = sign_document(r#"<sc><us ug="S1"/><c n="second" v="1"/></sc>"#);
        let digest = |signed: &str| {
            let start = signed.rfind("<cs v=\"").unwrap() + 7;
            let end = signed[start..].find('"').unwrap() + start;
            signed[start..end].to_string()
        };
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn signing_places_digest_before_closing_root_tag() {
        let signed = sign_document(r#"<sc><us ug="S1"/></sc>"#);
        assert!(signed.ends_with("/></sc>"));
        assert!(signed.contains("<cs v=\""));
    }

    #[test]
    fn unparsable_document_still_gets_zero_digest() {
        // Wire-compat quirk: signing never fails, the accumulator just
        // stays at zero.
        let signed = sign_document("<sc><broken");
        assert!(signed.ends_with("<cs v=\"0\"/>"));
    }
}
