//! Revarc Core Library
//!
//! Compact, reversible revision history for text documents:
//! - Version identifiers (major.minor)
//! - RCS-style line diff scripts
//! - Revision chains with snapshot/diff storage and reconstruction
//! - Flat text archive format, including legacy archives without metadata
//! - Author name encoding for archive headers
//! - Legacy metadata recovery from XML document exports

pub mod archive;
pub mod author;
pub mod chain;
pub mod config;
pub mod criteria;
pub mod diff;
pub mod error;
pub mod legacy;
pub mod record;
pub mod version;

pub use archive::{ParsedArchive, deserialize, deserialize_with, serialize};
pub use chain::{RevisionChain, RevisionNode, Storage};
pub use config::EngineConfig;
pub use criteria::{Range, RevisionCriteria};
pub use diff::{EditOp, Script};
pub use error::{ArchiveError, Result};
pub use legacy::{DocumentParser, ParserError, XmlDocumentParser};
pub use record::{RevisionInfo, RevisionMetadata, RevisionRecord};
pub use version::VersionId;
