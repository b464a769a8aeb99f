//! Graph identifiers, the read-only oracle the matching engine consumes,
//! and the bundled in-memory network implementation.

pub mod ident;
pub mod network;
pub mod oracle;

#[doc(inline)]
pub use ident::*;
#[doc(inline)]
pub use network::*;
#[doc(inline)]
pub use oracle::*;
