use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

const STATE_LENGTH: usize = 16;

/// Opaque value for the `state` and `nonce` parameters.
pub fn generate_random_state() -> String {
    random_string(STATE_LENGTH)
}

/// `size` bytes from the OS CSPRNG, URL-safe base64 without padding.
pub(crate) fn random_string(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
