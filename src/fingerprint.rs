//! Interaction fingerprinting for content-addressed storage
//!
//! A fingerprint names the cassette of one manifest interaction on disk and
//! joins a source session's cassette with its freshly re-recorded target.

use crate::manifest::RequestInteraction;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Compute the fingerprint of an interaction definition
///
/// The hashed input is the concatenation of:
/// 1. URL
/// 2. Method
/// 3. Expected status code in decimal (`0` when absent)
/// 4. Every header as `name ∥ value`, names in lexicographic order
/// 5. Payload
///
/// The 32-bit FNV-1a digest is rendered in decimal, matching sessions
/// recorded by earlier versions of the tool.
#[must_use]
pub fn fingerprint(interaction: &RequestInteraction) -> String {
    let mut hasher = Fnv1a::new();

    hasher.update(interaction.url.as_bytes());
    hasher.update(interaction.method.as_bytes());
    hasher.update(interaction.status_code.unwrap_or(0).to_string().as_bytes());

    // BTreeMap iteration is already sorted by name
    for (name, values) in &interaction.headers {
        for value in values {
            hasher.update(name.as_bytes());
            hasher.update(value.as_bytes());
        }
    }

    hasher.update(interaction.payload.as_bytes());

    hasher.finish().to_string()
}

/// Streaming 32-bit FNV-1a hasher
#[derive(Debug, Clone, Copy)]
struct Fnv1a(u32);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u32::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(self) -> u32 {
        self.0
    }
}
