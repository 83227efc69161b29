//! Leaf/chain splitting for PEM certificate bundles
//!
//! cert-manager writes `tls.crt` as the leaf certificate followed by its
//! issuing chain. ACM wants the two as separate inputs. The split is purely
//! line-based: nothing here decodes base64 or parses X.509, and malformed
//! input is passed through for ACM to reject.

/// Line that closes a PEM certificate block
pub const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// A PEM bundle split into its leaf certificate and chain
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PemBundle {
    /// First certificate, ending at the end marker with no trailing newline
    pub leaf: Vec<u8>,
    /// Every line after the first end marker, each newline-terminated
    pub chain: Vec<u8>,
}

/// Split a PEM bundle at its first certificate end marker
///
/// Lines before and including the first `-----END CERTIFICATE-----` form the
/// leaf; the marker line itself is written without a terminator. Every later
/// line goes to the chain. Without a marker the whole input is the leaf.
pub fn split_bundle(bundle: &[u8]) -> PemBundle {
    let text = String::from_utf8_lossy(bundle);
    let mut out = PemBundle::default();
    let mut in_chain = false;

    for line in text.lines() {
        if in_chain {
            out.chain.extend_from_slice(line.as_bytes());
            out.chain.push(b'\n');
        } else if line == END_CERTIFICATE {
            out.leaf.extend_from_slice(line.as_bytes());
            in_chain = true;
        } else {
            out.leaf.extend_from_slice(line.as_bytes());
            out.leaf.push(b'\n');
        }
    }

    out
}
