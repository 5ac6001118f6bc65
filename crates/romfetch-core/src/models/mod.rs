pub mod artwork;
pub mod connection;
pub mod entry;
pub mod transfer;

pub use artwork::*;
pub use connection::*;
pub use entry::*;
pub use transfer::*;
