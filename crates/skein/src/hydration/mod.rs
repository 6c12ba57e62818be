// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Hydration: exposing server-computed data to the browser.
//!
//! - [`registry`]: request-scoped window attribute claims and collisions
//! - [`safety`]: lexical classification of rendered HTML
//! - [`mount`]: locating the mount element
//! - [`inject`]: choosing the splice point and splicing
//! - [`payload`]: the JSON script artifact and CSP nonces

pub mod inject;
pub mod mount;
pub mod payload;
pub mod registry;
pub mod safety;

pub use inject::{
    earliest_injection_point, late_injection_point, InjectionOutcome, InjectionPosition,
    InjectionStrategy, Injector, Placement,
};
pub use mount::{find_mount_point, MountPoint};
pub use payload::{generate_nonce, HydrationPayload};
pub use registry::{HydrationClaim, HydrationRegistry, MergeStrategy, SourceLocation};
pub use safety::{HtmlSpans, LexicalSpan, SpanKind};
