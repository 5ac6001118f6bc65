//! Browse-and-transfer engine: one serialized session against an SFTP server
//! or a local directory, listings, batch copies and artwork lookups.

pub mod artwork;
pub mod backend;
pub mod connection;
pub mod coordinator;
pub mod copy;
pub mod engine;
pub mod error;
pub mod lister;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_support;

pub use artwork::{ArtworkLoader, ArtworkResult};
pub use connection::{ConnectionManager, SessionGuard};
pub use coordinator::{BatchHandle, TransferCoordinator, TransferEvent, TransferSettings};
pub use engine::{Engine, EngineEvent};
pub use error::{BackendError, ConnectionError, ListingError, Result, TransferError};
pub use lister::DirectoryLister;
pub use walker::RecursiveFolderWalker;
