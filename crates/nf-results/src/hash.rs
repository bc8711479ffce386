//! Content-based hashing for run IDs.

use sha2::{Digest, Sha256};

/// Run id from the serialized config and the start timestamp.
///
/// The timestamp keeps repeated runs of one config apart; identical inputs
/// always hash to the same id.
pub fn compute_run_id(config: &serde_json::Value, timestamp: &str) -> String {
    let mut hasher = Sha256::new();

    let config_json = serde_json::to_string(config).unwrap_or_default();
    hasher.update(config_json.as_bytes());
    hasher.update(timestamp.as_bytes());

    let result = hasher.finalize();
    let hex = format!("{:x}", result);
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_stability() {
        let config = json!({ "equation": "spiral", "niters": 10 });
        let a = compute_run_id(&config, "2026-01-01T00:00:00Z");
        let b = compute_run_id(&config, "2026-01-01T00:00:00Z");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let a = compute_run_id(&json!({ "niters": 10 }), "t0");
        let b = compute_run_id(&json!({ "niters": 11 }), "t0");
        let c = compute_run_id(&json!({ "niters": 10 }), "t1");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
