//! HTTP/1.0 and 1.1 message handling: parsing, serialization, chunked
//! transfer, compression, authentication, and the optional encryption
//! envelope (§4.6).

pub mod auth;
pub mod chunked;
pub mod compress;
pub mod crypto_envelope;
pub mod message;
pub mod parser;
pub mod serializer;
pub mod status;

pub use message::{HttpMessage, Role};
pub use parser::Parser;

/// Apply the negotiated compressor/encryption to an outbound body in the
/// wire order compress-then-encrypt (§4.6); the inverse
/// [`decode_body`] undoes both in the opposite order.
pub fn encode_body(
    body: &[u8],
    compressor: Option<compress::Compressor>,
    encryption: Option<(crypto_envelope::KeyBits, &str)>,
) -> Result<Vec<u8>, breakwater_common::ApplicationError> {
    let compressed = match compressor {
        Some(c) => c.encode(body)?,
        None => body.to_vec(),
    };
    Ok(match encryption {
        Some((bits, passphrase)) => crypto_envelope::encrypt(bits, passphrase, &compressed),
        None => compressed,
    })
}

pub fn decode_body(
    wire: &[u8],
    compressor: Option<compress::Compressor>,
    encryption: Option<(crypto_envelope::KeyBits, &str)>,
) -> Result<Vec<u8>, breakwater_common::BreakwaterError> {
    let decrypted = match encryption {
        Some((bits, passphrase)) => crypto_envelope::decrypt(bits, passphrase, wire)?,
        None => wire.to_vec(),
    };
    let plain = match compressor {
        Some(c) => c.decode(&decrypted)?,
        None => decrypted,
    };
    Ok(plain)
}
