//! Shared error taxonomy for breakwater.
//!
//! Every component reports failures through one of the five kinds below
//! rather than raw `std::io::Error` or protocol-specific enums, so that
//! callback dispatch (`error(flag, kind, text)`) and log output stay
//! uniform across transports, parsers, and the cluster supervisor.

pub mod error;

pub use error::{
    ApplicationError, BreakwaterError, ErrorFlag, FatalError, ProtocolError, ResourceError,
    TransportError,
};
