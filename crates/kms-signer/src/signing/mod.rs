mod signer;
mod kms;
mod rsa;
mod stub;

pub use signer::{HashAlgorithm, Signer, sign_message};
pub use kms::KmsSigner;
pub use self::rsa::RsaSigner;
pub use stub::StubSigner;
