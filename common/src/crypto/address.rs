use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

pub const OBJECT_ID_SIZE: usize = 32; // 32 bytes / 256 bits

// Identity of any owned or shared object on chain.
// Rendered as a 0x-prefixed hexadecimal string on every wire surface.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct ObjectId([u8; OBJECT_ID_SIZE]);

// Account addresses share the object-id representation on Sui
pub type SuiAddress = ObjectId;

impl ObjectId {
    pub const fn new(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        ObjectId(bytes)
    }

    pub const fn zero() -> Self {
        ObjectId::new([0; OBJECT_ID_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = &'static str;

    // Accepts short forms ("0x6") by left-padding to the full width,
    // the way the chain normalizes them
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        if stripped.is_empty() || stripped.len() > OBJECT_ID_SIZE * 2 {
            return Err("Invalid object id length");
        }
        let padded = format!("{:0>width$}", stripped, width = OBJECT_ID_SIZE * 2);
        let bytes = hex::decode(padded).map_err(|_| "Invalid hex string")?;
        let bytes: [u8; OBJECT_ID_SIZE] = bytes.try_into().map_err(|_| "Invalid object id")?;
        Ok(ObjectId::new(bytes))
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        ObjectId::from_str(&hex).map_err(SerdeError::custom)
    }
}

// Content hash of one specific version of an object, or of a transaction.
// Base58 on the wire; we never decode it, only compare and forward.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Digest(String);

pub type TransactionDigest = Digest;

impl Digest {
    pub fn new<S: Into<String>>(digest: S) -> Self {
        Digest(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Digest::new(s)
    }
}
