#![no_main]

use libfuzzer_sys::fuzz_target;
use tournament_sync_client::protocol::StatusSnapshot;
use tournament_sync_client::SessionState;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = serde_json::from_slice::<StatusSnapshot>(data) else {
        return;
    };

    // Hydrating from the same snapshot twice must not change anything.
    let mut state = SessionState::new(2, Some("alice".into()));
    state.hydrate(&snapshot);
    let once = state.clone();
    state.hydrate(&snapshot);
    assert_eq!(state, once);

    let mut names: Vec<_> = state.participants().iter().map(|p| &p.name).collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total, "duplicate participants after hydrate");
});
