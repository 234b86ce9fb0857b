//! Extensions shipped with the Hero framework.
//!
//! Enabled by the `builtin-extensions` feature (on by default). Bundled
//! extensions are registered into [`BUNDLED_EXTENSIONS`](crate::BUNDLED_EXTENSIONS)
//! and resolve by name like any other extension:
//!
//! | Extension | Description |
//! |-----------|-------------|
//! | [`essentials`] | `ping`, `help`, presence management, user registration |
//!
//! ```rust,ignore
//! core.load("essentials").await?;
//! ```

pub mod essentials;
