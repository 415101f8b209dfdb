//! Property-based tests for watch pattern scoping and event routing

use std::path::PathBuf;

use proptest::prelude::*;

use osmium_client::{WatchPatternSet, WatchRouter};

fn file_name() -> impl Strategy<Value = String> {
    // Bias towards the config-file names so both routing outcomes are hit
    prop_oneof![
        3 => "[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,11}",
        1 => Just(".solidhunter.json".to_string()),
        1 => Just("foundry.toml".to_string()),
    ]
}

fn directories() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..4)
}

fn path_from(directories: &[String], name: &str) -> PathBuf {
    let mut path = PathBuf::from("/ws");
    for directory in directories {
        path.push(directory);
    }
    path.push(name);
    path
}

proptest! {
    /// The router delivers an event to a subscription exactly when the
    /// subscription's own pattern set matches the path.
    #[test]
    fn routing_agrees_with_pattern_matching(
        dirs in directories(),
        name in file_name(),
    ) {
        let core = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();
        let foundry = WatchPatternSet::new(["**/foundry.toml"]).unwrap();

        let router = WatchRouter::new();
        let mut core_rx = router.subscribe("osmium-solidity", &core);
        let mut foundry_rx = router.subscribe("osmium-foundry", &foundry);

        let path = path_from(&dirs, &name);
        router.dispatch(&path);

        prop_assert_eq!(core_rx.try_recv().is_ok(), core.matches(&path));
        prop_assert_eq!(foundry_rx.try_recv().is_ok(), foundry.matches(&path));
    }

    /// The default config-file patterns match on the exact file name at any
    /// directory depth, and on nothing else.
    #[test]
    fn config_patterns_match_only_their_file_name(
        dirs in directories(),
        name in file_name(),
    ) {
        let core = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();
        let foundry = WatchPatternSet::new(["**/foundry.toml"]).unwrap();

        let path = path_from(&dirs, &name);
        prop_assert_eq!(core.matches(&path), name == ".solidhunter.json");
        prop_assert_eq!(foundry.matches(&path), name == "foundry.toml");
    }

    /// A session never receives another session's events, no matter how the
    /// event sequence interleaves.
    #[test]
    fn sessions_never_receive_foreign_events(
        events in prop::collection::vec(
            (directories(), prop_oneof![
                Just(".solidhunter.json".to_string()),
                Just("foundry.toml".to_string()),
                file_name(),
            ]),
            1..20,
        ),
    ) {
        let core = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();
        let foundry = WatchPatternSet::new(["**/foundry.toml"]).unwrap();

        let router = WatchRouter::new();
        let mut core_rx = router.subscribe("osmium-solidity", &core);
        let mut foundry_rx = router.subscribe("osmium-foundry", &foundry);

        let paths: Vec<PathBuf> = events
            .iter()
            .map(|(dirs, name)| path_from(dirs, name))
            .collect();
        for path in &paths {
            router.dispatch(path);
        }

        let expected_core: Vec<&PathBuf> =
            paths.iter().filter(|p| core.matches(p)).collect();
        let expected_foundry: Vec<&PathBuf> =
            paths.iter().filter(|p| foundry.matches(p)).collect();

        let mut received_core = Vec::new();
        while let Ok(path) = core_rx.try_recv() {
            received_core.push(path);
        }
        let mut received_foundry = Vec::new();
        while let Ok(path) = foundry_rx.try_recv() {
            received_foundry.push(path);
        }

        prop_assert_eq!(received_core.iter().collect::<Vec<_>>(), expected_core);
        prop_assert_eq!(received_foundry.iter().collect::<Vec<_>>(), expected_foundry);
    }

    /// After unsubscribing, a session receives nothing even when later events
    /// match its patterns.
    #[test]
    fn unsubscribed_sessions_receive_nothing(
        dirs in directories(),
    ) {
        let core = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();

        let router = WatchRouter::new();
        let mut rx = router.subscribe("osmium-solidity", &core);
        router.unsubscribe("osmium-solidity");

        router.dispatch(&path_from(&dirs, ".solidhunter.json"));
        prop_assert!(rx.try_recv().is_err());
    }
}
