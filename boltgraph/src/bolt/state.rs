// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt session states and the transition table
//!
//! The table only says whether a message may be handled in a state. Where a
//! handled message ends up depends on its outcome and is decided by the
//! session; a FAILURE always leads to `Failed`.

use super::message::MessageKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Handshake done, waiting for HELLO
    Connected,
    /// HELLO accepted, credentials still outstanding
    Authenticating,
    Ready,
    /// Auto-commit result waiting to be pulled
    Streaming,
    InTransaction,
    /// Result inside an explicit transaction waiting to be pulled
    TxStreaming,
    Failed,
    /// A running statement was cancelled by a timeout
    Interrupted,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connected => "CONNECTED",
            SessionState::Authenticating => "AUTHENTICATION",
            SessionState::Ready => "READY",
            SessionState::Streaming => "STREAMING",
            SessionState::InTransaction => "TX_READY",
            SessionState::TxStreaming => "TX_STREAMING",
            SessionState::Failed => "FAILED",
            SessionState::Interrupted => "INTERRUPTED",
            SessionState::Closed => "DEFUNCT",
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, SessionState::InTransaction | SessionState::TxStreaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session does with a message in its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Handle,
    /// Answer IGNORED and stay put
    Ignore,
    /// FAILURE, then close the connection
    Violation,
}

pub fn transition(state: SessionState, kind: MessageKind) -> Transition {
    use MessageKind as M;
    use SessionState as S;
    use Transition::{Handle, Ignore, Violation};

    match (state, kind) {
        (S::Closed, _) => Violation,
        (_, M::Goodbye) => Handle,

        (S::Connected, M::Hello) => Handle,
        (S::Connected, _) => Violation,

        (S::Authenticating, M::Logon) => Handle,
        (S::Authenticating, _) => Violation,

        (S::Failed | S::Interrupted, M::Reset) => Handle,
        (S::Failed | S::Interrupted, _) => Ignore,

        (_, M::Reset) => Handle,
        (_, M::Hello | M::Logon) => Violation,

        (S::Ready, M::Run | M::Begin | M::Commit | M::Rollback | M::Route | M::Logoff) => Handle,
        (S::Ready, M::Pull | M::Discard) => Violation,

        (S::Streaming, M::Pull | M::Discard) => Handle,
        (S::Streaming, _) => Violation,

        (S::InTransaction, M::Run | M::Commit | M::Rollback) => Handle,
        (S::InTransaction, _) => Violation,

        (S::TxStreaming, M::Run | M::Pull | M::Discard | M::Commit | M::Rollback) => Handle,
        (S::TxStreaming, _) => Violation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MessageKind as M;
    use SessionState as S;

    #[test]
    fn test_handshake_order() {
        assert_eq!(transition(S::Connected, M::Hello), Transition::Handle);
        assert_eq!(transition(S::Connected, M::Run), Transition::Violation);
        assert_eq!(transition(S::Authenticating, M::Logon), Transition::Handle);
        assert_eq!(transition(S::Authenticating, M::Run), Transition::Violation);
        assert_eq!(transition(S::Ready, M::Hello), Transition::Violation);
    }

    #[test]
    fn test_failed_ignores_until_reset() {
        for kind in [M::Run, M::Pull, M::Begin, M::Commit, M::Discard] {
            assert_eq!(transition(S::Failed, kind), Transition::Ignore);
            assert_eq!(transition(S::Interrupted, kind), Transition::Ignore);
        }
        assert_eq!(transition(S::Failed, M::Reset), Transition::Handle);
        assert_eq!(transition(S::Failed, M::Goodbye), Transition::Handle);
    }

    #[test]
    fn test_streaming_and_transactions() {
        assert_eq!(transition(S::Ready, M::Pull), Transition::Violation);
        assert_eq!(transition(S::Streaming, M::Run), Transition::Violation);
        assert_eq!(transition(S::InTransaction, M::Begin), Transition::Violation);
        assert_eq!(transition(S::TxStreaming, M::Run), Transition::Handle);
        assert_eq!(transition(S::TxStreaming, M::Commit), Transition::Handle);
        assert_eq!(transition(S::Ready, M::Rollback), Transition::Handle);
        assert_eq!(transition(S::Closed, M::Reset), Transition::Violation);
    }
}
