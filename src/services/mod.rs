pub mod notification;
pub mod opaque_token;
pub mod rotation_service;
pub mod signer;
pub mod token_hasher;
