#![no_main]

use libfuzzer_sys::fuzz_target;
use tournament_sync_client::protocol::PushMessage;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<PushMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<PushMessage>(s) {
            // Anything we accept must re-encode to something we accept again.
            let json = serde_json::to_string(&msg).expect("encode decoded frame");
            let again: PushMessage = serde_json::from_str(&json).expect("decode re-encoded frame");
            assert_eq!(again, msg);
        }
    }
});
