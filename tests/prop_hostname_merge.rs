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

use data_mesher::core::crypto::Signature;
use data_mesher::core::data::Hostname;
use proptest::prelude::*;

/// A claim is either tentative or signed at some time with some signature
/// bytes. Verification is orthogonal to the ordering rules exercised here.
fn claim(state: Option<(u64, u8)>) -> Hostname {
    let mut hostname = Hostname::new("wiki").unwrap();
    if let Some((signed_at, sig)) = state {
        hostname.signed_at = Some(signed_at);
        hostname.signature = Some(Signature(vec![sig; 64]));
    }
    hostname
}

fn merged(a: &Hostname, b: &Hostname) -> Hostname {
    let mut out = a.clone();
    out.merge(b);
    out
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(state in proptest::option::of((0u64..50, any::<u8>()))) {
        let a = claim(state);
        prop_assert_eq!(merged(&a, &a), a);
    }

    #[test]
    fn prop_merge_is_commutative(
        x in proptest::option::of((0u64..50, any::<u8>())),
        y in proptest::option::of((0u64..50, any::<u8>())),
    ) {
        let a = claim(x);
        let b = claim(y);
        prop_assert_eq!(merged(&a, &b), merged(&b, &a));
    }

    #[test]
    fn prop_merge_is_associative(
        x in proptest::option::of((0u64..50, any::<u8>())),
        y in proptest::option::of((0u64..50, any::<u8>())),
        z in proptest::option::of((0u64..50, any::<u8>())),
    ) {
        let a = claim(x);
        let b = claim(y);
        let c = claim(z);
        prop_assert_eq!(
            merged(&merged(&a, &b), &c),
            merged(&a, &merged(&b, &c))
        );
    }

    #[test]
    fn prop_the_earliest_signed_claim_always_wins(
        x in (0u64..50, any::<u8>()),
        y in (0u64..50, any::<u8>()),
    ) {
        let a = claim(Some(x));
        let b = claim(Some(y));
        let winner = if (x.0, vec![x.1; 64]) <= (y.0, vec![y.1; 64]) { &a } else { &b };
        prop_assert_eq!(&merged(&a, &b), winner);
        prop_assert_eq!(&merged(&b, &a), winner);
    }
}
