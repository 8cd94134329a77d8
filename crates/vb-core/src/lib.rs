//! Shared plumbing for the vendor clients and adapters: the HTTP transport
//! seam, error classification and payload redaction.

pub mod classify;
pub mod error;
pub mod logging;
pub mod redact;
pub mod transport;

pub use error::{ClassifiedError, ErrorKind, Result};
pub use logging::{LoggingTransport, with_logging};
pub use transport::{
    Body, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportConfig,
    TransportError,
};
