#![no_main]

use gateway_service::crypto::{bearer_token, verify_token, SigningKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Fixed key: arbitrary input must be rejected without panicking
    let Ok(key) = SigningKey::from_parts("fuzz-key".to_string(), vec![7u8; 64], 0) else {
        return;
    };

    let _ = verify_token(input, &key, 300);

    if let Some(token) = bearer_token(input) {
        let _ = verify_token(token, &key, 300);
    }
});
