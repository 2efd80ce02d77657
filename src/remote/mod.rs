// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote service boundary.
//!
//! The queue talks to the remote collection only through [`RemoteService`].
//! [`InMemoryRemote`] is an in-process implementation for demos and tests.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryRemote, RemoteCalls};
pub use traits::{RemoteError, RemoteRecord, RemoteService};
