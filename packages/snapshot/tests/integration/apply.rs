use ::common::{ContentHash, GamePath};
use provider_core::{ActorIdentity, AuxKind};
use snapshot::{ApplyRequest, AuxChoice, SnapshotError, UpdateOptions, apply::prepare};

use crate::common::{ApplyCall, TestSnapshots, local_actor, path};

async fn captured(t: &TestSnapshots) {
    t.env.set_file("a.tex", b"A");
    t.env.set_file("b.mdl", b"B");
    t.env.set_aux(AuxKind::Outfit, "outfit-1");
    t.session
        .capture("aria", &local_actor(0), &UpdateOptions::default())
        .await
        .unwrap();
}

fn applied_files(calls: &[ApplyCall]) -> Vec<GamePath> {
    calls
        .iter()
        .rev()
        .find_map(|c| match c {
            ApplyCall::Apply { files, .. } => Some(files.keys().cloned().collect()),
            _ => None,
        })
        .unwrap_or_default()
}

fn last_apply(calls: &[ApplyCall]) -> Option<(Vec<GamePath>, provider_core::AuxPayloads)> {
    calls.iter().rev().find_map(|c| match c {
        ApplyCall::Apply { files, aux, .. } => Some((files.keys().cloned().collect(), aux.clone())),
        _ => None,
    })
}

async fn apply_locked_then_recapture(t: &mut TestSnapshots, actor: &ActorIdentity) {
    captured(t).await;
    t.env.spawn_actor(actor.clone());
    t.session
        .apply("aria", &ApplyRequest::default(), actor)
        .await
        .unwrap();
    assert!(t.session.lock(actor));

    t.env.set_file("c.tex", b"C");
    t.env.set_aux(AuxKind::Shape, "other-pose");
    t.session
        .capture("aria", &local_actor(0), &UpdateOptions::default())
        .await
        .unwrap();
}

mod applying {
    use super::*;

    #[tokio::test]
    async fn apply_redirects_files_to_stored_blobs() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let actor = local_actor(5);
        t.env.spawn_actor(actor.clone());

        let application = t
            .session
            .apply("aria", &ApplyRequest::default(), &actor)
            .await
            .unwrap();

        assert_eq!(application.slot, 5);
        assert!(application.is_local);
        assert!(application.profile.is_some());
        let calls = t.env.calls();
        let ApplyCall::Apply { files, aux, .. } = &calls[0] else {
            panic!("expected an apply call, got {calls:?}");
        };
        assert_eq!(files.len(), 2);
        assert!(files.values().all(|p| p.starts_with(t.root().join("aria"))));
        assert_eq!(aux.get(&AuxKind::Outfit).map(String::as_str), Some("outfit-1"));
        assert_eq!(t.session.active().entries().len(), 1);
    }

    #[tokio::test]
    async fn missing_blob_is_skipped() {
        let mut t = TestSnapshots::new();
        let hash = t.env.set_file("a.tex", b"A");
        t.env.set_file("b.mdl", b"B");
        t.session
            .capture("aria", &local_actor(0), &UpdateOptions::default())
            .await
            .unwrap();
        let blob = t.root().join("aria/files").join(format!("{hash}.tex"));
        std::fs::remove_file(blob).unwrap();

        let actor = local_actor(0);
        t.env.spawn_actor(actor.clone());
        t.session
            .apply("aria", &ApplyRequest::default(), &actor)
            .await
            .unwrap();

        assert_eq!(applied_files(&t.env.calls()), vec![path("b.mdl")]);
    }

    #[tokio::test]
    async fn blob_found_under_any_extension() {
        let t = TestSnapshots::new();
        captured(&t).await;
        let repo = t.repo("aria").await;
        let files_dir = t.root().join("aria/files");
        let hash = ContentHash::from_hex("deadbeef").unwrap();
        std::fs::write(files_dir.join("deadbeef.dds"), b"texture").unwrap();

        let file = ::common::BlobStore::resolve_path(
            repo.blobs(),
            &hash,
            Some(&GamePath::new("chara/skin.tex")),
        )
        .await
        .unwrap();
        assert_eq!(file, Some(files_dir.join("deadbeef.dds")));
    }

    #[tokio::test]
    async fn apply_older_version_and_history_entry() {
        let mut t = TestSnapshots::new();
        t.env.set_file("a.tex", b"A");
        t.env.set_aux(AuxKind::Outfit, "first");
        let v0 = t
            .session
            .capture("aria", &local_actor(0), &UpdateOptions::default())
            .await
            .unwrap()
            .file_map_id;
        t.env.set_file("b.tex", b"B");
        t.env.set_aux(AuxKind::Outfit, "second");
        t.session
            .capture("aria", &local_actor(0), &UpdateOptions::default())
            .await
            .unwrap();

        let first = t.repo("aria").await.history(AuxKind::Outfit).await.unwrap()[0].id;
        let request = ApplyRequest {
            file_map: v0,
            outfit: AuxChoice::Entry(first),
            shape: AuxChoice::Skip,
            lock_aux: true,
            unlock_aux: false,
        };
        let prepared = prepare(&t.repo("aria").await, &request).await.unwrap();
        assert_eq!(prepared.files.len(), 1);
        assert_eq!(prepared.aux.get(&AuxKind::Outfit).map(String::as_str), Some("first"));

        let actor = local_actor(0);
        let application = t.session.apply("aria", &request, &actor).await.unwrap();
        assert!(application.aux_locked);
        assert_eq!(application.file_map_id, v0);
        assert!(t.session.active().is_aux_locked(&actor));
    }

    #[tokio::test]
    async fn reapplying_releases_the_previous_profile() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let actor = local_actor(2);

        let first = t
            .session
            .apply("aria", &ApplyRequest::default(), &actor)
            .await
            .unwrap();
        t.session
            .apply("aria", &ApplyRequest::default(), &actor)
            .await
            .unwrap();

        assert_eq!(t.session.active().entries().len(), 1);
        assert!(
            t.env
                .calls()
                .contains(&ApplyCall::Release(first.profile.unwrap()))
        );
    }

    #[tokio::test]
    async fn locked_aux_survives_reapplication() {
        let mut t = TestSnapshots::new();
        let actor = local_actor(3);
        apply_locked_then_recapture(&mut t, &actor).await;

        let application = t
            .session
            .apply("aria", &ApplyRequest::default(), &actor)
            .await
            .unwrap();

        let (files, aux) = last_apply(&t.env.calls()).unwrap();
        assert!(files.contains(&path("c.tex")));
        assert!(aux.is_empty());
        assert!(application.aux_locked);
        assert!(t.session.active().is_aux_locked(&actor));
    }

    #[tokio::test]
    async fn unlock_request_replaces_locked_aux() {
        let mut t = TestSnapshots::new();
        let actor = local_actor(3);
        apply_locked_then_recapture(&mut t, &actor).await;

        let request = ApplyRequest {
            unlock_aux: true,
            ..Default::default()
        };
        let application = t.session.apply("aria", &request, &actor).await.unwrap();

        let (_, aux) = last_apply(&t.env.calls()).unwrap();
        assert_eq!(aux.get(&AuxKind::Shape).map(String::as_str), Some("other-pose"));
        assert!(!application.aux_locked);
        assert!(!t.session.active().is_aux_locked(&actor));
    }

    #[tokio::test]
    async fn applying_unknown_snapshot_fails() {
        let mut t = TestSnapshots::new();
        let result = t
            .session
            .apply("nobody", &ApplyRequest::default(), &local_actor(0))
            .await;
        assert!(matches!(result, Err(SnapshotError::NotFound(_))));
    }
}

mod reverting {
    use super::*;

    #[tokio::test]
    async fn revert_follows_remapped_local_slot() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let before = local_actor(5);
        t.env.spawn_actor(before.clone());
        let application = t
            .session
            .apply("aria", &ApplyRequest::default(), &before)
            .await
            .unwrap();

        t.env.despawn(5);
        let after = local_actor(7);
        t.env.spawn_actor(after.clone());
        assert!(t.session.remap_local_slot(5, 7));

        let reverted = t.session.revert(&after).await.unwrap();

        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].slot, 7);
        assert!(t.session.active().is_empty());
        let calls = t.env.calls();
        assert!(calls.contains(&ApplyCall::Clear(7)));
        assert!(calls.contains(&ApplyCall::ResetAux(7)));
        assert!(calls.contains(&ApplyCall::Release(application.profile.unwrap())));
    }

    #[tokio::test]
    async fn automatic_revert_all_keeps_local_entry() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let local = local_actor(0);
        let other = ActorIdentity::new(12, false, "Bram");
        t.env.spawn_actor(local.clone());
        t.env.spawn_actor(other.clone());
        t.session
            .apply("aria", &ApplyRequest::default(), &local)
            .await
            .unwrap();
        t.session
            .apply("aria", &ApplyRequest::default(), &other)
            .await
            .unwrap();

        let reverted = t.session.revert_all(true).await.unwrap();
        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].name, "Bram");
        assert_eq!(t.session.active().entries().len(), 1);

        let reverted = t.session.revert_all(false).await.unwrap();
        assert_eq!(reverted.len(), 1);
        assert!(t.session.active().is_empty());
    }

    #[tokio::test]
    async fn revert_of_vanished_actor_still_cleans_up() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let other = ActorIdentity::new(12, false, "Bram");
        t.session
            .apply("aria", &ApplyRequest::default(), &other)
            .await
            .unwrap();

        let reverted = t.session.revert(&other).await.unwrap();
        assert_eq!(reverted.len(), 1);
        assert!(t.session.active().is_empty());
        assert!(t.env.calls().contains(&ApplyCall::Clear(12)));
    }

    #[tokio::test]
    async fn revalidate_drops_despawned_actors() {
        let mut t = TestSnapshots::new();
        captured(&t).await;
        let other = ActorIdentity::new(12, false, "Bram");
        t.env.spawn_actor(other.clone());
        t.session
            .apply("aria", &ApplyRequest::default(), &other)
            .await
            .unwrap();

        t.env.despawn(12);
        let dropped = t.session.revalidate().unwrap();
        assert_eq!(dropped.len(), 1);
        assert!(t.session.active().is_empty());
    }
}
