use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use handover_marshal::ADDR_LEN;

/// Which earbud owns the live connections to the handset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Secondary,
}

impl Role {
    /// The role the other earbud holds.
    pub fn peer(self) -> Self {
        match self {
            Role::Primary => Role::Secondary,
            Role::Secondary => Role::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BdAddr(pub [u8; ADDR_LEN]);

impl BdAddr {
    pub const fn new(bytes: [u8; ADDR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }

    /// True for the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDR_LEN]
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a string is not a `aa:bb:cc:dd:ee:ff` address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid bluetooth address: {0}")]
pub struct ParseAddrError(String);

impl FromStr for BdAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; ADDR_LEN];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(|| ParseAddrError(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParseAddrError(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddrError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseAddrError(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for BdAddr {
    type Error = ParseAddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BdAddr> for String {
    fn from(addr: BdAddr) -> Self {
        addr.to_string()
    }
}
