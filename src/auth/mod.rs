pub mod audience;
pub mod cookies;
pub mod extractor;
pub mod federated;
pub mod guard;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod policy;
pub mod recovery;
pub mod service;
pub mod tokens;
