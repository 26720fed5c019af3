// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Time as a capability, so merge and signing timestamps are testable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of unix-seconds timestamps.
///
/// Monotonicity per signer is enforced at the signing site
/// (`last_seen := max(now, last_seen + 1)`), not here.
pub trait Clock: Send + Sync {
    /// Current unix time in whole seconds.
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}
