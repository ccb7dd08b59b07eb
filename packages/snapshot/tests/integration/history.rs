use provider_core::AuxKind;
use snapshot::{PayloadComparison, RepositorySettings, SnapshotError, UpdateOptions};
use uuid::Uuid;

use crate::common::{TestSnapshots, local_actor, path};

async fn capture(t: &TestSnapshots) -> snapshot::UpdateOutcome {
    t.session
        .capture("aria", &local_actor(0), &UpdateOptions::default())
        .await
        .unwrap()
}

mod history_entries {
    use super::*;

    #[tokio::test]
    async fn unchanged_payload_on_new_version_gets_new_entry() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, r#"{"hat":1}"#);
        let v0 = capture(&t).await.file_map_id;

        t.env.set_file("b.tex", b"B");
        let v1 = capture(&t).await.file_map_id;
        assert_ne!(v0, v1);

        let entries = t.repo("aria").await.history(AuxKind::Outfit).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_map_id, v0);
        assert_eq!(entries[1].file_map_id, v1);
        assert_eq!(entries[0].payload, entries[1].payload);
    }

    #[tokio::test]
    async fn unchanged_payload_and_version_is_not_duplicated() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, r#"{"hat":1}"#);
        capture(&t).await;
        let outcome = capture(&t).await;

        assert!(outcome.appended.is_empty());
        let entries = t.repo("aria").await.history(AuxKind::Outfit).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn changed_payload_on_same_version_gets_new_entry() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Shape, r#"{"height":0.5}"#);
        capture(&t).await;
        t.env.set_aux(AuxKind::Shape, r#"{"height":0.6}"#);
        let outcome = capture(&t).await;

        assert!(!outcome.new_version);
        assert_eq!(outcome.appended, vec![AuxKind::Shape]);
        let entries = t.repo("aria").await.history(AuxKind::Shape).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_map_id, entries[1].file_map_id);
    }

    #[tokio::test]
    async fn tolerant_comparison_ignores_float_noise() {
        let settings = RepositorySettings {
            comparison: PayloadComparison::Tolerant(1e-4),
            ..Default::default()
        };
        let t = TestSnapshots::with_settings(settings, true);
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Shape, r#"{"height":0.5}"#);
        capture(&t).await;
        t.env.set_aux(AuxKind::Shape, r#"{"height":0.50000001}"#);
        let outcome = capture(&t).await;

        assert!(outcome.appended.is_empty());
    }

    #[tokio::test]
    async fn kinds_are_tracked_independently() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, "outfit-1");
        t.env.set_aux(AuxKind::Shape, "shape-1");
        capture(&t).await;
        t.env.set_aux(AuxKind::Shape, "shape-2");
        capture(&t).await;

        let repo = t.repo("aria").await;
        assert_eq!(repo.history(AuxKind::Outfit).await.unwrap().len(), 1);
        assert_eq!(repo.history(AuxKind::Shape).await.unwrap().len(), 2);
    }
}

mod history_edits {
    use super::*;

    #[tokio::test]
    async fn rename_and_delete_persist() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, "one");
        capture(&t).await;
        t.env.set_aux(AuxKind::Outfit, "two");
        capture(&t).await;

        let repo = t.repo("aria").await;
        let entries = repo.history(AuxKind::Outfit).await.unwrap();
        repo.rename_history(AuxKind::Outfit, entries[0].id, "Gala")
            .await
            .unwrap();
        let removed = repo.delete_history(AuxKind::Outfit, entries[1].id).await.unwrap();
        assert_eq!(removed.payload, "two");

        let reopened = t.repo("aria").await;
        let entries = reopened.history(AuxKind::Outfit).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "Gala");
    }

    #[tokio::test]
    async fn unknown_entry_is_an_error() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        capture(&t).await;

        let repo = t.repo("aria").await;
        let result = repo.delete_history(AuxKind::Shape, Uuid::new_v4()).await;
        assert!(matches!(result, Err(SnapshotError::EntryNotFound { .. })));
    }

    #[tokio::test]
    async fn entry_resolves_to_the_files_of_its_time() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, "casual");
        capture(&t).await;
        t.env.set_file("b.tex", b"B");
        t.env.set_aux(AuxKind::Outfit, "formal");
        capture(&t).await;

        let repo = t.repo("aria").await;
        let entries = repo.history(AuxKind::Outfit).await.unwrap();
        let casual = repo
            .resolve_for_entry(AuxKind::Outfit, entries[0].id)
            .await
            .unwrap();
        let formal = repo
            .resolve_for_entry(AuxKind::Outfit, entries[1].id)
            .await
            .unwrap();

        assert_eq!(casual.len(), 1);
        assert_eq!(formal.len(), 2);
        assert!(formal.contains_key(&path("b.tex")));
    }

    #[tokio::test]
    async fn manual_append_uses_current_version() {
        let t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        let current = capture(&t).await.file_map_id;

        let repo = t.repo("aria").await;
        let entry = repo
            .append_history(AuxKind::Shape, "tall", "Manual")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.file_map_id, current);
        assert!(
            repo.append_history(AuxKind::Shape, "tall", "Again")
                .await
                .unwrap()
                .is_none()
        );
    }
}
