// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the vault is built against.
//!
//! Traits use `#[async_trait]` for dynamic dispatch compatibility, so backends
//! can be chosen at runtime from configuration and the host platform.

pub mod key_provider;

pub use key_provider::KeyProvider;
