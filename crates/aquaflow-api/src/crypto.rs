// Login-blob decryption.
//
// The portal wraps the login response in a base64 AES-256-CBC blob with a
// fixed key/IV pair. The padding scheme is the vendor's own null-padding,
// not PKCS#7: trailing NUL bytes (and any trailing whitespace under them)
// are stripped after block decryption. Decrypt-only; nothing this client
// sends is encrypted.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Error;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Portal AES key, hex-encoded (32 bytes).
pub const PORTAL_KEY_HEX: &str =
    "7c8a2e91b44f6d03a5e7190c2f8b6d4e1a9c0f3b5d7e2468ace13579bdf02468";

/// Portal AES IV, hex-encoded (16 bytes).
pub const PORTAL_IV_HEX: &str = "4d2a7f91c3e8b60513f7a9d2c4e6081b";

/// Decode a hex string into bytes. Only called on the compile-time
/// constants above, so malformed input is a programmer error.
fn decode_hex(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).expect("hex constant is ASCII");
            u8::from_str_radix(s, 16).expect("hex constant is valid hex")
        })
        .collect()
}

/// Decrypt a base64 AES-256-CBC login blob into the cleartext XML fragment.
///
/// Fails on empty input, invalid base64, ciphertext that is not a whole
/// number of AES blocks, or cleartext that is not UTF-8.
pub fn decrypt(base64_payload: &str) -> Result<String, Error> {
    let trimmed = base64_payload.trim();
    if trimmed.is_empty() {
        return Err(Error::Decryption("empty payload".into()));
    }

    let mut data = BASE64
        .decode(trimmed)
        .map_err(|e| Error::Decryption(format!("invalid base64: {e}")))?;

    if data.is_empty() || data.len() % 16 != 0 {
        return Err(Error::Decryption(format!(
            "ciphertext length {} is not a multiple of the AES block size",
            data.len()
        )));
    }

    let key = decode_hex(PORTAL_KEY_HEX);
    let iv = decode_hex(PORTAL_IV_HEX);

    let decryptor = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| Error::Decryption(format!("invalid key/iv length: {e}")))?;
    let cleartext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut data)
        .map_err(|e| Error::Decryption(format!("block decryption failed: {e}")))?;

    let text = std::str::from_utf8(cleartext)
        .map_err(|e| Error::Decryption(format!("cleartext is not UTF-8: {e}")))?;

    // Vendor null-padding: strip trailing NULs, then trailing whitespace.
    Ok(text.trim_end_matches('\0').trim_end().to_owned())
}
