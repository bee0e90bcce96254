// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt handshake and version negotiation

use std::fmt;

/// Preamble every client sends first
pub const MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Reply when no proposal can be honoured
pub const NO_VERSION: [u8; 4] = [0, 0, 0, 0];

/// Versions this server speaks, newest first
pub const SUPPORTED_VERSIONS: [BoltVersion; 6] = [
    BoltVersion::new(5, 4),
    BoltVersion::new(5, 3),
    BoltVersion::new(5, 2),
    BoltVersion::new(5, 1),
    BoltVersion::new(5, 0),
    BoltVersion::new(4, 4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoltVersion {
    pub major: u8,
    pub minor: u8,
}

impl BoltVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Node and relationship structures carry element ids from 5.0
    pub fn has_element_ids(&self) -> bool {
        self.major >= 5
    }

    /// Authentication moved from HELLO to LOGON in 5.1
    pub fn uses_logon(&self) -> bool {
        *self >= BoltVersion::new(5, 1)
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [0, 0, self.minor, self.major]
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Pick the first client proposal we support. Each proposal is
/// `[0, range, minor, major]` and covers `minor - range ..= minor`.
pub fn negotiate(proposals: &[u8; 16]) -> Option<BoltVersion> {
    proposals.chunks_exact(4).find_map(|proposal| {
        let (range, minor, major) = (proposal[1], proposal[2], proposal[3]);
        if major == 0 {
            return None;
        }
        let lowest = minor.saturating_sub(range);
        SUPPORTED_VERSIONS
            .iter()
            .find(|v| v.major == major && v.minor <= minor && v.minor >= lowest)
            .copied()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposals(list: &[[u8; 4]]) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (i, p) in list.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(p);
        }
        out
    }

    #[test]
    fn test_negotiates_highest_in_range() {
        let offer = proposals(&[[0, 4, 4, 5], [0, 0, 4, 4]]);
        assert_eq!(negotiate(&offer), Some(BoltVersion::new(5, 4)));

        let offer = proposals(&[[0, 2, 8, 5]]);
        assert_eq!(negotiate(&offer), None);

        let offer = proposals(&[[0, 0, 9, 5], [0, 0, 2, 5]]);
        assert_eq!(negotiate(&offer), Some(BoltVersion::new(5, 2)));
    }

    #[test]
    fn test_legacy_proposal() {
        let offer = proposals(&[[0, 0, 4, 4], [0, 0, 3, 4]]);
        assert_eq!(negotiate(&offer), Some(BoltVersion::new(4, 4)));
        assert_eq!(BoltVersion::new(4, 4).to_bytes(), [0, 0, 4, 4]);
    }

    #[test]
    fn test_nothing_supported() {
        assert_eq!(negotiate(&proposals(&[[0, 0, 0, 3], [0, 0, 4, 1]])), None);
        assert_eq!(negotiate(&[0u8; 16]), None);
    }

    #[test]
    fn test_feature_gates() {
        assert!(!BoltVersion::new(4, 4).has_element_ids());
        assert!(BoltVersion::new(5, 0).has_element_ids());
        assert!(!BoltVersion::new(5, 0).uses_logon());
        assert!(BoltVersion::new(5, 1).uses_logon());
    }
}
