//! Stable numeric identity for a credential.
//!
//! The identity routes callback payloads back to the owning bank client. It is
//! a 32-bit FNV-1a hash of the token: not collision resistant, which only holds
//! up for a small operator-controlled set of credentials. [`crate::router::Clients`]
//! refuses to start with two tokens hashing to the same identity.

use secrecy::{ExposeSecret, SecretString};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

pub fn client_id(token: &SecretString) -> u32 {
    fnv1a32(token.expose_secret().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_client_id_is_stable() {
        let token = SecretString::new("uXz-token".to_owned());

        assert_eq!(client_id(&token), client_id(&token.clone()));
        assert_ne!(client_id(&token), client_id(&SecretString::new("other".to_owned())));
    }
}
