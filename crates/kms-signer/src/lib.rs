pub mod config;
pub mod error;
pub mod signing;
pub mod signed_url;
pub mod fetch;
pub mod token;
pub mod listing;

pub use config::{Config, Endpoints, KeyReference, TokenSettings};
pub use signing::{HashAlgorithm, KmsSigner, RsaSigner, Signer, StubSigner};
pub use signed_url::{ObjectRef, SignedUrlOptions, UrlSigner, UrlStyle};
pub use fetch::fetch;
pub use token::{AuthorizedClient, CachedTokenSource, KmsTokenConfig, KmsTokenSource, Token, TokenSource};
pub use listing::{Pager, PubSubTopics, StorageBuckets};
