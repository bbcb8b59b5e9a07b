//! SOCKS5 client, CONNECT command only (RFC 1928, username/password auth
//! per RFC 1929). §4.8.

use breakwater_common::ProtocolError;

const VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UsernamePassword,
}

impl AuthMethod {
    fn byte(self) -> u8 {
        match self {
            AuthMethod::NoAuth => 0x00,
            AuthMethod::UsernamePassword => 0x02,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Target {
    Ipv4(std::net::Ipv4Addr, u16),
    Ipv6(std::net::Ipv6Addr, u16),
    Domain(String, u16),
}

/// Steps of the client state machine: greeting -> (auth) -> request ->
/// reply. Any out-of-order or malformed byte is terminal (§4.8 edge case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingMethodSelection,
    AwaitingAuthResult,
    AwaitingConnectReply,
    Established,
    Failed,
}

pub struct Client {
    state: ClientState,
    credentials: Option<(String, String)>,
}

impl Client {
    pub fn new(credentials: Option<(String, String)>) -> Self {
        Client {
            state: ClientState::AwaitingMethodSelection,
            credentials,
        }
    }

    /// Build the initial greeting: version, method count, method list.
    pub fn greeting(&self) -> Vec<u8> {
        let methods: &[AuthMethod] = if self.credentials.is_some() {
            &[AuthMethod::UsernamePassword]
        } else {
            &[AuthMethod::NoAuth]
        };
        let mut out = vec![VERSION, methods.len() as u8];
        out.extend(methods.iter().map(|m| m.byte()));
        out
    }

    /// Consume the server's method-selection reply (2 bytes). Returns the
    /// next bytes to send: the auth sub-negotiation if username/password
    /// was selected, or `None` if the client should proceed straight to
    /// the CONNECT request.
    pub fn on_method_selected(&mut self, reply: &[u8; 2]) -> Result<Option<Vec<u8>>, ProtocolError> {
        if reply[0] != VERSION {
            self.state = ClientState::Failed;
            return Err(ProtocolError::Socks5BadReply("bad version in method reply".into()));
        }
        match reply[1] {
            0x00 => {
                self.state = ClientState::AwaitingConnectReply;
                Ok(None)
            }
            0x02 => {
                let (user, pass) = self
                    .credentials
                    .as_ref()
                    .ok_or_else(|| ProtocolError::Socks5BadReply("server requires auth but none configured".into()))?;
                self.state = ClientState::AwaitingAuthResult;
                Ok(Some(build_auth_request(user, pass)))
            }
            0xFF => {
                self.state = ClientState::Failed;
                Err(ProtocolError::Socks5BadReply("no acceptable auth method".into()))
            }
            other => {
                self.state = ClientState::Failed;
                Err(ProtocolError::Socks5BadReply(format!("unsupported method 0x{other:02x}")))
            }
        }
    }

    /// Consume the 2-byte username/password sub-negotiation result.
    pub fn on_auth_result(&mut self, reply: &[u8; 2]) -> Result<(), ProtocolError> {
        if reply[1] != 0x00 {
            self.state = ClientState::Failed;
            return Err(ProtocolError::Socks5BadReply("authentication rejected".into()));
        }
        self.state = ClientState::AwaitingConnectReply;
        Ok(())
    }

    pub fn connect_request(&self, target: &Target) -> Vec<u8> {
        build_connect_request(target)
    }

    /// Parse a CONNECT reply. Returns the bound address on success.
    /// `buf` must contain the whole reply (variable length depending on
    /// ATYP); returns `Ok(None)` if more bytes are needed.
    pub fn on_connect_reply(&mut self, buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        if buf[0] != VERSION {
            self.state = ClientState::Failed;
            return Err(ProtocolError::Socks5BadReply("bad version in connect reply".into()));
        }
        if buf[1] != 0x00 {
            self.state = ClientState::Failed;
            return Err(ProtocolError::Socks5BadReply(format!(
                "connect failed, reply code 0x{:02x}",
                buf[1]
            )));
        }
        let atyp = buf[3];
        let addr_len = match atyp {
            ATYP_IPV4 => 4,
            ATYP_IPV6 => 16,
            ATYP_DOMAIN => {
                if buf.len() < 5 {
                    return Ok(None);
                }
                1 + buf[4] as usize
            }
            other => {
                self.state = ClientState::Failed;
                return Err(ProtocolError::Socks5BadReply(format!("unknown ATYP 0x{other:02x}")));
            }
        };
        let total = 4 + addr_len + 2;
        if buf.len() < total {
            return Ok(None);
        }
        self.state = ClientState::Established;
        Ok(Some(total))
    }

    pub fn state(&self) -> ClientState {
        self.state
    }
}

fn build_auth_request(user: &str, pass: &str) -> Vec<u8> {
    let mut out = vec![0x01, user.len() as u8];
    out.extend_from_slice(user.as_bytes());
    out.push(pass.len() as u8);
    out.extend_from_slice(pass.as_bytes());
    out
}

fn build_connect_request(target: &Target) -> Vec<u8> {
    let mut out = vec![VERSION, CMD_CONNECT, 0x00];
    match target {
        Target::Ipv4(addr, port) => {
            out.push(ATYP_IPV4);
            out.extend_from_slice(&addr.octets());
            out.extend_from_slice(&port.to_be_bytes());
        }
        Target::Ipv6(addr, port) => {
            out.push(ATYP_IPV6);
            out.extend_from_slice(&addr.octets());
            out.extend_from_slice(&port.to_be_bytes());
        }
        Target::Domain(name, port) => {
            out.push(ATYP_DOMAIN);
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&port.to_be_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_advertises_no_auth_without_credentials() {
        let client = Client::new(None);
        assert_eq!(client.greeting(), vec![0x05, 0x01, 0x00]);
    }

    #[test]
    fn greeting_advertises_username_password_with_credentials() {
        let client = Client::new(Some(("u".into(), "p".into())));
        assert_eq!(client.greeting(), vec![0x05, 0x01, 0x02]);
    }

    #[test]
    fn no_auth_selection_proceeds_straight_to_connect() {
        let mut client = Client::new(None);
        let next = client.on_method_selected(&[0x05, 0x00]).unwrap();
        assert!(next.is_none());
        assert_eq!(client.state(), ClientState::AwaitingConnectReply);
    }

    #[test]
    fn username_password_selection_builds_auth_request() {
        let mut client = Client::new(Some(("alice".into(), "pw".into())));
        let next = client.on_method_selected(&[0x05, 0x02]).unwrap().unwrap();
        assert_eq!(next, vec![0x01, 5, b'a', b'l', b'i', b'c', b'e', 2, b'p', b'w']);
    }

    #[test]
    fn no_acceptable_methods_is_terminal() {
        let mut client = Client::new(None);
        assert!(client.on_method_selected(&[0x05, 0xFF]).is_err());
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[test]
    fn connect_request_encodes_domain_target() {
        let client = Client::new(None);
        let req = client.connect_request(&Target::Domain("example.com".into(), 443));
        assert_eq!(req[0], 0x05);
        assert_eq!(req[1], 0x01);
        assert_eq!(req[3], 0x03);
        assert_eq!(req[4], 11);
    }

    #[test]
    fn connect_reply_ipv4_completes_and_reports_length() {
        let mut client = Client::new(None);
        client.state = ClientState::AwaitingConnectReply;
        let reply = [0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90];
        let consumed = client.on_connect_reply(&reply).unwrap().unwrap();
        assert_eq!(consumed, reply.len());
        assert_eq!(client.state(), ClientState::Established);
    }

    #[test]
    fn truncated_connect_reply_asks_for_more() {
        let mut client = Client::new(None);
        client.state = ClientState::AwaitingConnectReply;
        let reply = [0x05, 0x00, 0x00, 0x01, 127, 0];
        assert_eq!(client.on_connect_reply(&reply).unwrap(), None);
    }
}
