// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for plan document decoding, canonicalization and fingerprinting

#![no_main]

use libfuzzer_sys::fuzz_target;
use planprint_core::{
    extract_filter_stats, extract_runtime, fingerprint, normalize, simplify, NormalizerPolicy,
    PlanDocument, SimplifierPolicy,
};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Malformed documents must be rejected with an error, never a panic
    let Ok(doc) = PlanDocument::from_value(&value) else {
        return;
    };

    let normalized = normalize(&doc, &NormalizerPolicy::default());
    let first = fingerprint(&normalized).expect("canonical tree always serializes");
    let second = fingerprint(&normalized).expect("canonical tree always serializes");
    assert_eq!(first, second);

    if let Ok(tree) = simplify(&doc, &SimplifierPolicy::default()) {
        let _ = fingerprint(&tree);
    }

    let _ = extract_runtime(&doc);
    let _ = extract_filter_stats(&doc);
});
