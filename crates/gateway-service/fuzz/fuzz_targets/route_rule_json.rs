#![no_main]

use gateway_service::models::RouteRule;
use gateway_service::services::route_table::validate_rule;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(rules) = serde_json::from_slice::<Vec<RouteRule>>(data) {
        for mut rule in rules {
            rule.method = rule.method.trim().to_ascii_uppercase();
            if validate_rule(&rule).is_ok() {
                assert!(rule.request_path.starts_with('/'));
                assert!(!rule.request_path.chars().any(char::is_whitespace));
                assert!(!rule.method.is_empty());
                if let Some(target) = rule.target_url.as_deref() {
                    assert!(target.starts_with("http://") || target.starts_with("https://"));
                }
            }
            let _ = rule.key();
        }
    }
});
