mod client;
mod handle;

pub use client::{ClientOptions, StorageClient, DEFAULT_ENDPOINT};
pub use handle::{HandleCache, StorageHandle};
