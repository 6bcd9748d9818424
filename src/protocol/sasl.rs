//! SASL mechanisms used by the handshake of [`SaslTransport`](super::SaslTransport).
use std::fmt;

use super::TransportError;

pub const MECHANISM_PLAIN: &str = "PLAIN";

/// Status byte leading every handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NegotiationStatus {
    Start = 0x01,
    Ok = 0x02,
    Bad = 0x03,
    Error = 0x04,
    Complete = 0x05,
}

impl TryFrom<u8> for NegotiationStatus {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, TransportError> {
        match value {
            0x01 => Ok(NegotiationStatus::Start),
            0x02 => Ok(NegotiationStatus::Ok),
            0x03 => Ok(NegotiationStatus::Bad),
            0x04 => Ok(NegotiationStatus::Error),
            0x05 => Ok(NegotiationStatus::Complete),
            other => Err(TransportError::InvalidHandshakeState(other)),
        }
    }
}

impl From<NegotiationStatus> for u8 {
    fn from(value: NegotiationStatus) -> Self {
        value as u8
    }
}

/// Negotiated protection level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Qop {
    /// Authentication only; frames pass through unmodified.
    #[default]
    Auth,
    /// Integrity protected frames.
    AuthInt,
    /// Confidentiality protected frames.
    AuthConf,
}

impl Qop {
    pub fn wraps(&self) -> bool {
        !matches!(self, Qop::Auth)
    }
}

impl fmt::Display for Qop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qop::Auth => write!(f, "auth"),
            Qop::AuthInt => write!(f, "auth-int"),
            Qop::AuthConf => write!(f, "auth-conf"),
        }
    }
}

/// Client side of a SASL mechanism.
///
/// `wrap`/`unwrap` are only called when [`Mechanism::qop`] reports a protecting level
/// once the handshake has completed.
pub trait Mechanism: fmt::Debug + Send {
    fn name(&self) -> &str;

    /// Initial response sent right after the mechanism name. May be empty.
    fn start(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Response to a server challenge.
    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, TransportError>;

    fn qop(&self) -> Qop {
        Qop::Auth
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(data.to_vec())
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(data.to_vec())
    }
}

/// RFC 4616 `PLAIN`: a single message carrying the credentials in the clear.
pub struct Plain {
    username: String,
    password: String,
}

impl Plain {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Plain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plain")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        MECHANISM_PLAIN
    }

    fn start(&mut self) -> Result<Vec<u8>, TransportError> {
        // authzid NUL authcid NUL passwd
        let mut out = Vec::with_capacity(self.username.len() * 2 + self.password.len() + 2);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        Ok(out)
    }

    fn step(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Mechanism(
            "unexpected server challenge for PLAIN".into(),
        ))
    }
}

/// Picks the first mechanism in `offered` that this client implements.
pub fn select_mechanism(
    offered: &[String],
    username: &str,
    password: &str,
) -> Result<Box<dyn Mechanism>, TransportError> {
    for name in offered {
        if name.eq_ignore_ascii_case(MECHANISM_PLAIN) {
            return Ok(Box::new(Plain::new(username, password)));
        }
    }
    Err(TransportError::UnsupportedMechanism(offered.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_initial_response() {
        let mut plain = Plain::new("admin", "p@ss");
        assert_eq!(plain.start().unwrap(), b"admin\0admin\0p@ss");
    }

    #[test]
    fn plain_rejects_challenge() {
        let mut plain = Plain::new("admin", "p@ss");
        assert!(matches!(
            plain.step(b"nonce"),
            Err(TransportError::Mechanism(_))
        ));
    }

    #[test]
    fn select_plain_case_insensitive() {
        let mech = select_mechanism(&["GSSAPI".into(), "plain".into()], "u", "p").unwrap();
        assert_eq!(mech.name(), MECHANISM_PLAIN);
        assert_eq!(mech.qop(), Qop::Auth);
    }

    #[test]
    fn select_unsupported_mechanism() {
        let err = select_mechanism(&["GSSAPI".into()], "u", "p").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedMechanism(m) if m == vec!["GSSAPI"]));
    }

    #[test]
    fn status_bytes() {
        for byte in 1..=5_u8 {
            let status = NegotiationStatus::try_from(byte).unwrap();
            assert_eq!(u8::from(status), byte);
        }
        assert!(matches!(
            NegotiationStatus::try_from(9),
            Err(TransportError::InvalidHandshakeState(9))
        ));
    }
}
