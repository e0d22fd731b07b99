// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers, grouped by surface.

pub mod auth;
pub mod billing;
pub mod executors;
pub mod internal;
pub mod meta;
pub mod oauth;
pub mod orgs;
pub mod secrets;
pub mod sessions;
pub mod toolsets;
pub mod workflows;

use serde::Serialize;
use serde_json::{Value, json};
use vespid_store::Page;

/// Render a cursored page as `{items, nextCursor}`.
pub(crate) fn page_body<T: Serialize>(page: Page<T>) -> Value {
    json!({ "items": page.items, "nextCursor": page.next_cursor })
}
