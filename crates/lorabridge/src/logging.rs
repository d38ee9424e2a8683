// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Call tracing helpers on top of the `log` facade.
//!
//! All operational logging in this crate goes through `log::debug!`/`info!`/
//! `warn!` with a `[tag]` prefix identifying the subsystem. The `trace_fn!`
//! macro additionally marks function entry for call-stack instrumentation;
//! it compiles to nothing unless the `trace` Cargo feature is enabled.

/// Function entry trace marker.
///
/// Logs `[ENTER:FNC] function_name` at trace level.
/// Only active when the `trace` feature is enabled.
///
/// # Example
/// ```ignore
/// fn handle_datagram(&self, data: &[u8]) {
///     crate::trace_fn!("Handler::handle_datagram");
///     // ...
/// }
/// ```
#[macro_export]
#[cfg(feature = "trace")]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        log::trace!("[ENTER:FNC] {}", $fn_name);
    };
}

/// No-op trace macro (when trace feature disabled).
#[macro_export]
#[cfg(not(feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}
