//! Access-token handling. Tokens are issued by the identity service; this
//! server only validates them (and mints them in tests and tooling).

pub mod jwt;
