//! Serde helpers that render byte fields as uppercase hex strings

use serde::Serializer;

/// Serialize a byte buffer as an uppercase hex string
pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]> + ?Sized,
{
    serializer.serialize_str(&hex::encode_upper(bytes.as_ref()))
}

/// Serialize an optional byte buffer as an uppercase hex string or null
pub fn serialize_option<S, T>(bytes: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    match bytes {
        Some(b) => serializer.serialize_str(&hex::encode_upper(b.as_ref())),
        None => serializer.serialize_none(),
    }
}
