//! # Post Identifier Types and Constants
//!
//! This module defines the identifier shared by client and server. Internally
//! a post id is a 12-byte [`ObjectId`] assigned by the storage layer; on the
//! wire it travels as a 24-character lowercase hexadecimal string.
//!
//! Callers should treat the string form as an opaque token: the only contract
//! is that it is unique and assigned by the server.
//!
//! ## Constants
//!
//! - [`POST_ID_SIZE`] - Size (in bytes) of the binary identifier
//! - [`POST_ID_HEX_LEN`] - Length of the external hexadecimal form

use crate::Error;
use bson::oid::ObjectId;
use core::{fmt, str::FromStr};

/// The number of bytes in the binary form of a [`PostId`].
pub const POST_ID_SIZE: usize = 12;

/// The number of characters in the hexadecimal form of a [`PostId`].
pub const POST_ID_HEX_LEN: usize = POST_ID_SIZE * 2;

/// Identifier of a stored blog post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostId(ObjectId);

impl PostId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parses the external hexadecimal form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] unless `s` is exactly
    /// [`POST_ID_HEX_LEN`] hexadecimal characters.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.len() != POST_ID_HEX_LEN {
            return Err(Error::InvalidId { id: s.to_owned() });
        }
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidId { id: s.to_owned() })
    }

    pub const fn object_id(&self) -> ObjectId {
        self.0
    }

    pub const fn bytes(&self) -> [u8; POST_ID_SIZE] {
        self.0.bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for PostId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<PostId> for ObjectId {
    fn from(id: PostId) -> Self {
        id.0
    }
}

impl FromStr for PostId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_its_own_display_form() {
        let id = PostId::new();
        let hex = id.to_string();
        assert_eq!(hex.len(), POST_ID_HEX_LEN);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(hex.parse::<PostId>().unwrap(), id);
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "abc", "zzzzzzzzzzzzzzzzzzzzzzzz", "5f5ac3c80a6a1d94c129475a00"] {
            assert_eq!(
                PostId::parse(bad),
                Err(Error::InvalidId { id: bad.to_owned() }),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn generated_ids_are_distinct() {
        let ids: HashSet<_> = (0..1024).map(|_| PostId::new()).collect();
        assert_eq!(ids.len(), 1024);
    }

    #[test]
    fn exposes_twelve_raw_bytes() {
        let id = PostId::parse("5f5ac3c80a6a1d94c129475a").unwrap();
        assert_eq!(
            id.bytes(),
            [0x5f, 0x5a, 0xc3, 0xc8, 0x0a, 0x6a, 0x1d, 0x94, 0xc1, 0x29, 0x47, 0x5a]
        );
    }
}
