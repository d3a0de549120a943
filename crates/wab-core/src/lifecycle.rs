//! Connection state machine of the messaging client.
//!
//! `Disconnected -> Authenticating -> (QrPending | SessionRestoring) -> Connected -> Disconnected`

use serde::Serialize;

use crate::messaging::client::ClientEvent;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Fresh authentication started; waiting for a QR code or credentials.
    Authenticating,
    QrPending {
        qr: String,
    },
    /// Restoring a stored session blob.
    SessionRestoring,
    Connected,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::QrPending { .. } => "qr_pending",
            Self::SessionRestoring => "session_restoring",
            Self::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// An authentication attempt is running; a second one must not start.
    pub fn auth_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::QrPending { .. } | Self::SessionRestoring
        )
    }

    pub fn qr(&self) -> Option<&str> {
        match self {
            Self::QrPending { qr } => Some(qr),
            _ => None,
        }
    }

    /// State entered when an authentication attempt starts, or `None` if one
    /// is already running or the client is connected.
    pub fn begin_auth(&self, restoring: bool) -> Option<Self> {
        if self.auth_in_flight() || self.is_connected() {
            return None;
        }
        Some(if restoring {
            Self::SessionRestoring
        } else {
            Self::Authenticating
        })
    }

    /// Transition driven by a client event. `None` means "no change".
    pub fn on_event(&self, ev: &ClientEvent) -> Option<Self> {
        match ev {
            ClientEvent::Qr(code) if !self.is_connected() => Some(Self::QrPending { qr: code.clone() }),
            ClientEvent::Qr(_) => None,
            // Scanned: wait for Ready without advertising a stale QR.
            ClientEvent::Authenticated if matches!(self, Self::QrPending { .. }) => {
                Some(Self::Authenticating)
            }
            ClientEvent::Authenticated => None,
            ClientEvent::AuthFailure(_) => Some(Self::Disconnected),
            ClientEvent::Ready => Some(Self::Connected),
            ClientEvent::Message(_) => None,
            ClientEvent::Disconnected(_) => Some(Self::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::client::DisconnectReason;

    #[test]
    fn fresh_authentication_path() {
        let s = ConnectionState::Disconnected;
        let s = s.begin_auth(false).unwrap();
        assert_eq!(s, ConnectionState::Authenticating);

        let s = s.on_event(&ClientEvent::Qr("code".into())).unwrap();
        assert_eq!(s.qr(), Some("code"));

        let s = s.on_event(&ClientEvent::Authenticated).unwrap();
        assert_eq!(s, ConnectionState::Authenticating);

        let s = s.on_event(&ClientEvent::Ready).unwrap();
        assert!(s.is_connected());

        let s = s
            .on_event(&ClientEvent::Disconnected(DisconnectReason::Other("x".into())))
            .unwrap();
        assert_eq!(s, ConnectionState::Disconnected);
    }

    #[test]
    fn restore_path_and_failure() {
        let s = ConnectionState::Disconnected.begin_auth(true).unwrap();
        assert_eq!(s, ConnectionState::SessionRestoring);
        assert_eq!(s.on_event(&ClientEvent::Authenticated), None);
        assert_eq!(
            s.on_event(&ClientEvent::AuthFailure("bad".into())),
            Some(ConnectionState::Disconnected)
        );
    }

    #[test]
    fn only_one_authentication_in_flight() {
        assert!(ConnectionState::Authenticating.begin_auth(false).is_none());
        assert!(ConnectionState::SessionRestoring.begin_auth(true).is_none());
        assert!(ConnectionState::QrPending { qr: "q".into() }
            .begin_auth(false)
            .is_none());
        assert!(ConnectionState::Connected.begin_auth(false).is_none());
    }

    #[test]
    fn qr_is_ignored_while_connected() {
        assert_eq!(
            ConnectionState::Connected.on_event(&ClientEvent::Qr("q".into())),
            None
        );
    }

    #[test]
    fn serializes_with_state_tag() {
        let v = serde_json::to_value(ConnectionState::QrPending { qr: "abc".into() }).unwrap();
        assert_eq!(v, serde_json::json!({ "state": "qr_pending", "qr": "abc" }));
    }
}
