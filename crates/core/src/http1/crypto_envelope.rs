//! Optional payload encryption envelope signalled by the
//! `X-AWH-Encryption: <128|192|256>` header (§4.6). The body is compressed
//! first, then encrypted on the wire; decoding reverses that order.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use breakwater_common::ProtocolError;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

const PBKDF2_ROUNDS: u32 = 10_000;
const IV_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBits {
    Bits128,
    Bits192,
    Bits256,
}

impl KeyBits {
    pub fn header_value(self) -> &'static str {
        match self {
            KeyBits::Bits128 => "128",
            KeyBits::Bits192 => "192",
            KeyBits::Bits256 => "256",
        }
    }

    pub fn from_header_value(v: &str) -> Option<Self> {
        match v.trim() {
            "128" => Some(KeyBits::Bits128),
            "192" => Some(KeyBits::Bits192),
            "256" => Some(KeyBits::Bits256),
            _ => None,
        }
    }

    fn byte_len(self) -> usize {
        match self {
            KeyBits::Bits128 => 16,
            KeyBits::Bits192 => 24,
            KeyBits::Bits256 => 32,
        }
    }
}

fn derive_key(bits: KeyBits, passphrase: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut key = vec![0u8; bits.byte_len()];
    pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut key);
    key
}

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt `plaintext` (already compressed, if applicable) under a key
/// derived from `passphrase` with a freshly generated salt+IV, prefixed
/// onto the ciphertext as `salt(16) || iv(16) || ciphertext`.
pub fn encrypt(bits: KeyBits, passphrase: &str, plaintext: &[u8]) -> Vec<u8> {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut salt);
    rand::rng().fill_bytes(&mut iv);
    let key = derive_key(bits, passphrase.as_bytes(), &salt);

    let ciphertext = match bits {
        KeyBits::Bits128 => {
            Aes128CbcEnc::new(key.as_slice().into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        KeyBits::Bits192 => {
            Aes192CbcEnc::new(key.as_slice().into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        KeyBits::Bits256 => {
            Aes256CbcEnc::new(key.as_slice().into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
    };

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Reverse of [`encrypt`]: split the salt/IV prefix, derive the key, and
/// decrypt. Returns a `ProtocolError` on truncated input or bad padding
/// (most likely a wrong passphrase).
pub fn decrypt(bits: KeyBits, passphrase: &str, envelope: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if envelope.len() < 32 {
        return Err(ProtocolError::EncryptionEnvelopeTruncated);
    }
    let salt = &envelope[0..16];
    let iv = &envelope[16..32];
    let ciphertext = &envelope[32..];
    let key = derive_key(bits, passphrase.as_bytes(), salt);

    let result = match bits {
        KeyBits::Bits128 => {
            Aes128CbcDec::new(key.as_slice().into(), iv.into()).decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        }
        KeyBits::Bits192 => {
            Aes192CbcDec::new(key.as_slice().into(), iv.into()).decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        }
        KeyBits::Bits256 => {
            Aes256CbcDec::new(key.as_slice().into(), iv.into()).decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        }
    };
    result.map_err(|_| ProtocolError::EncryptionPaddingInvalid)
}
