// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

pub mod coalesce;
pub mod durable;
pub mod fake;
pub mod memory;

/// Durable-tier failure. Logged and swallowed by the service; never surfaced
/// to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError(pub String);

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CacheError {}
