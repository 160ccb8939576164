//! Claim order of the command store under arbitrary enqueue sequences

use anidb_queue_core::queue::{ClaimFilter, CommandStore, MemoryCommandStore, NewCommand};
use anidb_queue_core::{EnqueueOutcome, Partition, Priority};
use proptest::prelude::*;

fn command(key: u32, priority: u8) -> NewCommand {
    NewCommand {
        partition: Partition::General,
        command_type: "GetEpisode".to_string(),
        command_key: format!("GetEpisode_{key}"),
        priority: Priority::new(priority).unwrap(),
        payload: format!("{{\"type\":\"GetEpisode\",\"eid\":{key}}}"),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_claims_follow_priority_then_insertion(
        commands in prop::collection::vec((0u32..40, 1u8..=11), 1..60)
    ) {
        let claimed = runtime().block_on(async {
            let store = MemoryCommandStore::new();
            for (key, priority) in &commands {
                store.insert_if_absent(&command(*key, *priority)).await.unwrap();
            }
            let mut claimed = Vec::new();
            while let Some(next) = store
                .claim_next(Partition::General, &ClaimFilter::none())
                .await
                .unwrap()
            {
                store.delete(next.id).await.unwrap();
                claimed.push(next.command_key);
            }
            claimed
        });

        // First insert of each key wins; later duplicates are ignored
        let mut expected: Vec<(u8, usize, String)> = Vec::new();
        for (position, (key, priority)) in commands.iter().enumerate() {
            let key = format!("GetEpisode_{key}");
            if !expected.iter().any(|(_, _, k)| *k == key) {
                expected.push((*priority, position, key));
            }
        }
        expected.sort();
        let expected: Vec<String> = expected.into_iter().map(|(_, _, key)| key).collect();

        prop_assert_eq!(claimed, expected);
    }

    #[test]
    fn test_duplicates_resolve_to_the_first_id(
        key in 0u32..1000,
        first in 1u8..=11,
        second in 1u8..=11,
    ) {
        let (a, b) = runtime().block_on(async {
            let store = MemoryCommandStore::new();
            let a = store.insert_if_absent(&command(key, first)).await.unwrap();
            let b = store.insert_if_absent(&command(key, second)).await.unwrap();
            (a, b)
        });

        prop_assert!(matches!(a, EnqueueOutcome::Inserted(_)));
        prop_assert_eq!(b, EnqueueOutcome::Existing(a.id()));
    }
}
