//! Property tests over random edit sequences.

use lockstep_lsp::{ChangeEvent, DID_CHANGE, DID_OPEN, SyncConfig, SyncKind};
use lockstep_types::apply_changes;
use proptest::prelude::*;
use serde_json::Value;

use crate::common::{Harness, RecordingServer, content_changes, version_of};

#[derive(Debug, Clone)]
struct Step {
    start: usize,
    delete: usize,
    insert: String,
    flush: bool,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (any::<usize>(), 0usize..4, "[a-zé😀\n]{0,4}", any::<bool>()).prop_map(
        |(start, delete, insert, flush)| Step {
            start,
            delete,
            insert,
            flush,
        },
    )
}

struct Recording {
    notifications: Vec<(&'static str, Value)>,
    /// Buffer text at every flush that sent a `didChange`.
    flushed: Vec<String>,
    final_text: String,
}

/// Drive `steps` through a headless synchronizer and record the wire.
fn record(kind: SyncKind, initial: &str, steps: &[Step]) -> Recording {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let h = Harness::new(RecordingServer::new(), false);
        let doc = h.editor("prop.rs", kind, &SyncConfig::headless(), initial);
        doc.sync.open_handshake().await.unwrap();

        let mut flushed = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let text = doc.text();
            let bounds: Vec<usize> = text
                .char_indices()
                .map(|(at, _)| at)
                .chain(std::iter::once(text.len()))
                .collect();
            let start = step.start % bounds.len();
            let end = (start + step.delete).min(bounds.len() - 1);
            doc.buffer_edit(bounds[start], bounds[end] - bounds[start], &step.insert);

            if step.flush || i + 1 == steps.len() {
                let delivery = doc.sync.flush();
                if !delivery.is_skipped() {
                    flushed.push(doc.text());
                }
                assert!(delivery.await || kind == SyncKind::None);
            }
        }
        assert!(doc.sync.close().await);

        Recording {
            notifications: h.server.notifications(),
            flushed,
            final_text: doc.text(),
        }
    })
}

fn changes(recording: &Recording) -> Vec<Vec<ChangeEvent>> {
    recording
        .notifications
        .iter()
        .filter(|(method, _)| *method == DID_CHANGE)
        .map(|(_, params)| content_changes(params))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_incremental_replay_reproduces_text(
        initial in "[a-z\n]{0,12}",
        steps in prop::collection::vec(step_strategy(), 1..24),
    ) {
        let recording = record(SyncKind::Incremental, &initial, &steps);

        let mut replayed = initial.clone();
        for events in changes(&recording) {
            prop_assert!(!events.is_empty());
            replayed = apply_changes(&replayed, &events).unwrap();
        }
        prop_assert_eq!(replayed, recording.final_text);
    }

    #[test]
    fn prop_full_sync_sends_one_event_per_flush(
        initial in "[a-z\n]{0,12}",
        steps in prop::collection::vec(step_strategy(), 1..24),
    ) {
        let recording = record(SyncKind::Full, &initial, &steps);

        let sent = changes(&recording);
        prop_assert_eq!(sent.len(), recording.flushed.len());
        for (events, text) in sent.iter().zip(&recording.flushed) {
            prop_assert_eq!(events.len(), 1);
            prop_assert_eq!(&events[0], &ChangeEvent::full(text.clone()));
        }
    }

    #[test]
    fn prop_versions_strictly_increase(
        kind in prop_oneof![Just(SyncKind::Full), Just(SyncKind::Incremental), Just(SyncKind::None)],
        steps in prop::collection::vec(step_strategy(), 1..24),
    ) {
        let recording = record(kind, "", &steps);

        let versions: Vec<i64> = recording
            .notifications
            .iter()
            .filter(|(method, _)| *method == DID_OPEN || *method == DID_CHANGE)
            .map(|(_, params)| version_of(params))
            .collect();
        prop_assert_eq!(versions[0], 1);
        prop_assert!(versions.windows(2).all(|pair| pair[1] == pair[0] + 1));
        if kind == SyncKind::None {
            prop_assert_eq!(versions.len(), 1);
        }
    }
}
