//! Counter names emitted by the interceptor.

use std::sync::Once;

use metrics::{Unit, describe_counter};

pub const HIT_TOTAL: &str = "rescache_hit_total";
pub const MISS_TOTAL: &str = "rescache_miss_total";
pub const STORE_TOTAL: &str = "rescache_store_total";
pub const STORE_ERROR_TOTAL: &str = "rescache_store_error_total";
pub const INVALIDATED_KEYS_TOTAL: &str = "rescache_invalidated_keys_total";

const COUNTERS: [(&str, &str); 5] = [
    (HIT_TOTAL, "Responses served from the cache, by resource."),
    (
        MISS_TOTAL,
        "Lookups that fell through to the handler, by resource.",
    ),
    (STORE_TOTAL, "Responses written to the cache, by resource."),
    (
        STORE_ERROR_TOTAL,
        "Swallowed store failures, by operation (get, set, scan, delete).",
    ),
    (
        INVALIDATED_KEYS_TOTAL,
        "Keys removed by DELETE invalidation or purge, by resource.",
    ),
];

static DESCRIBED: Once = Once::new();

/// Register counter descriptions with the installed recorder, once.
pub fn describe() {
    DESCRIBED.call_once(|| {
        for (name, description) in COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
    });
}
