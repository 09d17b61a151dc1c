//! Routing table identifiers.
//!
//! Every forwarding table is stamped with a random 128-bit id when it is
//! built. Peers remember the id next to the last epoch they saw; a
//! different id means the table was rebuilt and the remembered epoch no
//! longer refers to anything.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Random (version 4 layout) identifier, displayed in UUID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutingTableId([u8; 16]);

impl RoutingTableId {
    /// The all-zero id. Receivers start here before hearing from a peer.
    pub const NIL: Self = Self([0u8; 16]);

    pub fn generate() -> Self {
        let mut bytes: [u8; 16] = rand::random();
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl Default for RoutingTableId {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Display for RoutingTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid routing table id: {0:?}")]
pub struct ParseTableIdError(String);

impl FromStr for RoutingTableId {
    type Err = ParseTableIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(&compact, &mut bytes).map_err(|_| ParseTableIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for RoutingTableId {
    type Error = ParseTableIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoutingTableId> for String {
    fn from(id: RoutingTableId) -> String {
        id.to_string()
    }
}
