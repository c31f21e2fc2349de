//! Network Level Authentication plumbing.
//!
//! CredSSP itself (TS-Request framing, NTLM, public-key binding) is an
//! external concern behind [`NlaAuthenticator`]; the connector only
//! shuttles opaque tokens over the upgraded stream. The exchange is done
//! once `accept` returns an empty token.

use opalrdp_core::WriteBuf;

use crate::{ConnectorResult, Written};

/// An opaque CredSSP authenticator.
///
/// Implementations own the NTLM / Kerberos machinery and the TS-Request
/// encoding; the connector never looks inside a token.
pub trait NlaAuthenticator: Send {
    /// The first client token (the negotiate message, TS-Request wrapped).
    fn initial_token(&mut self) -> ConnectorResult<Vec<u8>>;

    /// Consumes a server token and produces the next client token.
    /// An empty return means the exchange is complete.
    fn accept(&mut self, server_token: &[u8]) -> ConnectorResult<Vec<u8>>;

    /// GSS-style wrap, used for the public-key and credential payloads.
    fn encrypt(&mut self, plaintext: &[u8]) -> ConnectorResult<Vec<u8>>;

    /// Domain, user and password for the final TS-Credentials payload.
    fn credentials(&self) -> ConnectorResult<(Vec<u8>, Vec<u8>, Vec<u8>)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlaState {
    SendInitialToken,
    WaitServerToken,
    Complete,
}

/// Drives the token shuttle between the transport and an authenticator.
pub struct NlaSequence<'a> {
    pub state: NlaState,
    authenticator: &'a mut dyn NlaAuthenticator,
}

impl<'a> NlaSequence<'a> {
    pub fn new(authenticator: &'a mut dyn NlaAuthenticator) -> Self {
        Self {
            state: NlaState::SendInitialToken,
            authenticator,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == NlaState::Complete
    }

    /// Wants more server bytes before the next step?
    pub fn wants_input(&self) -> bool {
        self.state == NlaState::WaitServerToken
    }

    pub fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        match self.state {
            NlaState::SendInitialToken => {
                let token = self.authenticator.initial_token()?;
                trace!(token_len = token.len(), "Send initial CredSSP token");

                output.write_slice(&token);
                self.state = NlaState::WaitServerToken;

                Written::from_size(token.len())
            }
            NlaState::WaitServerToken => {
                let response = self.authenticator.accept(input)?;

                if response.is_empty() {
                    debug!("CredSSP exchange complete");
                    self.state = NlaState::Complete;
                    Ok(Written::Nothing)
                } else {
                    trace!(token_len = response.len(), "Send CredSSP token");
                    output.write_slice(&response);
                    Written::from_size(response.len())
                }
            }
            NlaState::Complete => Err(general_err!("CredSSP exchange already complete")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned two-round-trip authenticator.
    struct ScriptedAuthenticator {
        responses: Vec<Vec<u8>>,
        seen: Vec<Vec<u8>>,
    }

    impl NlaAuthenticator for ScriptedAuthenticator {
        fn initial_token(&mut self) -> ConnectorResult<Vec<u8>> {
            Ok(b"NEGOTIATE".to_vec())
        }

        fn accept(&mut self, server_token: &[u8]) -> ConnectorResult<Vec<u8>> {
            self.seen.push(server_token.to_vec());
            if self.responses.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(self.responses.remove(0))
            }
        }

        fn encrypt(&mut self, plaintext: &[u8]) -> ConnectorResult<Vec<u8>> {
            Ok(plaintext.to_vec())
        }

        fn credentials(&self) -> ConnectorResult<(Vec<u8>, Vec<u8>, Vec<u8>)> {
            Ok((Vec::new(), b"user".to_vec(), b"pass".to_vec()))
        }
    }

    #[test]
    fn token_shuttle_runs_to_completion() {
        let mut authenticator = ScriptedAuthenticator {
            responses: vec![b"AUTHENTICATE".to_vec()],
            seen: Vec::new(),
        };
        let mut sequence = NlaSequence::new(&mut authenticator);
        let mut output = WriteBuf::new();

        let written = sequence.step(&[], &mut output).unwrap();
        assert_eq!(&output[..written.size().unwrap()], b"NEGOTIATE");
        assert!(sequence.wants_input());

        output.clear();
        let written = sequence.step(b"CHALLENGE", &mut output).unwrap();
        assert_eq!(&output[..written.size().unwrap()], b"AUTHENTICATE");
        assert!(sequence.wants_input());

        output.clear();
        let written = sequence.step(b"PUBKEY_OK", &mut output).unwrap();
        assert!(written.is_nothing());
        assert!(sequence.is_complete());

        assert_eq!(authenticator.seen, vec![b"CHALLENGE".to_vec(), b"PUBKEY_OK".to_vec()]);
    }
}
