// scenario.rs — End-to-end board flows against in-memory clones.

use wl_board::{BoardError, ItemStatus, ItemUpdate, NewItem, StampInput};
use wl_review::testing::FakeGitHub;
use wl_review::{GitHubProvider, RepoRef, ReviewEvent};
use wl_store::{Database, MemoryRemote, MemoryStore, MAIN};
use wl_workspace::{
    Board, BranchOwner, ErrorClass, MutationOptions, WorkflowMode, WorkspaceConfig,
    WorkspaceError,
};

fn config(rig: &str, mode: WorkflowMode) -> WorkspaceConfig {
    WorkspaceConfig::new("hop/commons", rig, "commons", format!("/tmp/{}", rig), rig)
        .with_mode(mode)
}

fn offline() -> MutationOptions {
    MutationOptions {
        no_push: true,
        ..Default::default()
    }
}

#[test]
fn wild_west_lifecycle_with_reject_and_accept() {
    let store = MemoryStore::new();
    let a = config("rig-a", WorkflowMode::WildWest);
    let b = config("rig-b", WorkflowMode::WildWest);
    let as_a = Board::new(&store, &a).with_options(offline());
    let as_b = Board::new(&store, &b).with_options(offline());

    let posted = as_a.post(NewItem::new("Document the sync flow")).unwrap();
    let id = posted.item.id.clone();
    assert_eq!(posted.item.status, ItemStatus::Open);
    assert_eq!(posted.item.posted_by, "rig-a");
    assert!(posted.branch.is_none());
    assert!(posted.push.skipped());

    let claimed = as_b.claim(&id).unwrap();
    assert_eq!(claimed.item.status, ItemStatus::Claimed);
    assert_eq!(claimed.item.claimed_by.as_deref(), Some("rig-b"));

    let err = as_a.done(&id, "https://example.com/evidence").unwrap_err();
    assert!(matches!(
        err,
        WorkspaceError::Board(BoardError::NotClaimedByYou { .. })
    ));
    assert!(err.to_string().contains("not claimed by you"));

    let done = as_b.done(&id, "https://example.com/evidence").unwrap();
    assert_eq!(done.item.status, ItemStatus::InReview);
    assert!(store.completion(&id).unwrap().is_some());

    let rejected = as_a.reject(&id, Some("missing tests")).unwrap();
    assert_eq!(rejected.item.status, ItemStatus::Claimed);
    assert!(store.completion(&id).unwrap().is_none());

    as_b.done(&id, "https://example.com/evidence-2").unwrap();
    assert_eq!(store.item(&id).unwrap().unwrap().status, ItemStatus::InReview);

    let accepted = as_a.accept(&id, StampInput::new(4)).unwrap();
    assert_eq!(accepted.item.status, ItemStatus::Completed);
    let stamp = accepted.stamp.unwrap();
    assert_eq!(stamp.author, "rig-a");
    assert_eq!(stamp.subject, "rig-b");
    assert_eq!(stamp.quality, 4);
    assert_eq!(store.stamps_for("rig-b").unwrap().len(), 1);

    let completion = store.completion(&id).unwrap().unwrap();
    assert_eq!(completion.validated_by.as_deref(), Some("rig-a"));
    assert_eq!(completion.stamp_id.as_deref(), Some(stamp.id.as_str()));

    // Terminal.
    assert!(as_b.claim(&id).is_err());
    assert_eq!(store.current_branch().unwrap(), MAIN);
}

#[test]
fn wild_west_pushes_to_both_remotes() {
    let upstream = MemoryRemote::new();
    let origin = MemoryRemote::new();
    let store = MemoryStore::with_fork(&upstream, &origin);
    let a = config("rig-a", WorkflowMode::WildWest);

    let out = Board::new(&store, &a)
        .post(NewItem::new("Shared item"))
        .unwrap();
    assert_eq!(out.push.pushed, vec!["upstream/main", "origin/main"]);
    assert!(upstream.item(MAIN, &out.item.id).is_some());
    assert!(origin.item(MAIN, &out.item.id).is_some());
    assert!(out.warnings.is_empty());
}

#[test]
fn unreachable_upstream_only_warns() {
    let upstream = MemoryRemote::new();
    let origin = MemoryRemote::new();
    let store = MemoryStore::with_fork(&upstream, &origin);
    let a = config("rig-a", WorkflowMode::WildWest);
    upstream.set_reachable(false);

    let out = Board::new(&store, &a).post(NewItem::new("Offline post")).unwrap();
    assert_eq!(out.item.status, ItemStatus::Open);
    assert!(out.warnings.iter().any(|w| w.class == ErrorClass::Sync));
    assert!(out.warnings.iter().any(|w| w.class == ErrorClass::Push));
    assert!(store.item(&out.item.id).unwrap().is_some());

    upstream.set_reachable(true);
    let report = Board::new(&store, &a).sync(true).unwrap();
    assert!(report.warnings.is_empty());
    assert!(upstream.item(MAIN, &out.item.id).is_some());
}

#[test]
fn pr_mode_claim_review_approve_merge() {
    let upstream = MemoryRemote::new();
    let alice_fork = MemoryRemote::new();
    let bob_fork = MemoryRemote::new();
    let alice_clone = MemoryStore::with_fork(&upstream, &alice_fork);
    let bob_clone = MemoryStore::with_fork(&upstream, &bob_fork);

    let github = FakeGitHub::new();
    github.seed_repo(&RepoRef::new("hop", "commons"));
    github.seed_repo(&RepoRef::new("bob", "commons"));
    let provider = GitHubProvider::with_transport(github.clone());

    let alice = config("alice", WorkflowMode::WildWest);
    let posted = Board::new(&alice_clone, &alice)
        .post(NewItem::new("Fix the parser"))
        .unwrap();
    let id = posted.item.id.clone();

    let bob = config("bob", WorkflowMode::Pr);
    let as_bob = Board::new(&bob_clone, &bob).with_provider(Some(&provider));
    let claimed = as_bob.claim(&id).unwrap();
    let branch = format!("wl/bob/{}", id);
    assert_eq!(claimed.branch.as_deref(), Some(branch.as_str()));
    assert_eq!(claimed.push.pushed, vec![format!("origin/{}", branch)]);
    assert!(bob_fork.has_branch(&branch));
    // Canonical is untouched until the merge.
    assert_eq!(upstream.item(MAIN, &id).unwrap().status, ItemStatus::Open);
    assert_eq!(bob_clone.current_branch().unwrap(), MAIN);

    let opened = as_bob.open_review(&id).unwrap();
    assert!(opened.created);
    let again = as_bob.open_review(&id).unwrap();
    assert!(!again.created);
    assert_eq!(again.pr.unwrap().url, opened.pr.clone().unwrap().url);
    assert_eq!(github.pulls().len(), 1);

    github.set_user("alice");
    let as_alice = Board::new(&alice_clone, &alice).with_provider(Some(&provider));
    let owner = BranchOwner::new("bob", None);
    as_alice
        .submit_review(&id, &owner, ReviewEvent::Approve, "looks good")
        .unwrap()
        .unwrap();

    let merged = as_bob.merge(&id, &as_bob.own_branch()).unwrap();
    assert_eq!(merged.item.status, ItemStatus::Claimed);
    assert_eq!(merged.gate.unwrap().approvals, vec!["alice"]);
    assert!(merged.closed.is_some());
    assert!(merged.warnings.is_empty(), "{:?}", merged.warnings);
    assert_eq!(upstream.item(MAIN, &id).unwrap().status, ItemStatus::Claimed);
    assert!(!bob_clone.branch_exists(&branch).unwrap());

    let pull = &github.pulls()[0];
    assert!(!pull.open);
    assert_eq!(pull.comments.len(), 1);
    assert!(github
        .branch_sha(&RepoRef::new("bob", "commons"), &branch)
        .is_none());
}

#[test]
fn pr_mode_field_edit_reaches_canonical_on_merge() {
    let upstream = MemoryRemote::new();
    let alice_fork = MemoryRemote::new();
    let bob_fork = MemoryRemote::new();
    let alice_clone = MemoryStore::with_fork(&upstream, &alice_fork);
    let bob_clone = MemoryStore::with_fork(&upstream, &bob_fork);

    let alice = config("alice", WorkflowMode::WildWest);
    let id = Board::new(&alice_clone, &alice)
        .post(NewItem::new("Tune the cache"))
        .unwrap()
        .item
        .id;
    let before = upstream.item(MAIN, &id).unwrap();
    assert_ne!(before.priority, 0);

    let bob = config("bob", WorkflowMode::Pr);
    let as_bob = Board::new(&bob_clone, &bob);
    let edit = ItemUpdate {
        priority: Some(0),
        ..Default::default()
    };
    let updated = as_bob.update(&id, edit).unwrap();
    assert_eq!(updated.item.status, ItemStatus::Open);
    assert_eq!(upstream.item(MAIN, &id).unwrap().priority, before.priority);

    let merged = as_bob.merge(&id, &as_bob.own_branch()).unwrap();
    assert_eq!(merged.item.status, ItemStatus::Open);
    assert!(merged
        .push
        .pushed
        .contains(&"upstream/main".to_string()));
    assert_eq!(upstream.item(MAIN, &id).unwrap().priority, 0);
}

#[test]
fn reviewer_merges_another_rigs_branch_from_their_fork() {
    let upstream = MemoryRemote::new();
    let alice_fork = MemoryRemote::new();
    let bob_fork = MemoryRemote::new();
    let alice_clone = MemoryStore::with_fork(&upstream, &alice_fork);
    alice_clone.add_peer("bob", bob_fork.clone());
    let bob_clone = MemoryStore::with_fork(&upstream, &bob_fork);

    let alice_ww = config("alice", WorkflowMode::WildWest);
    let id = Board::new(&alice_clone, &alice_ww)
        .post(NewItem::new("Port the importer"))
        .unwrap()
        .item
        .id;

    let bob = config("bob", WorkflowMode::Pr);
    Board::new(&bob_clone, &bob).claim(&id).unwrap();
    let branch = format!("wl/bob/{}", id);
    assert!(bob_fork.has_branch(&branch));
    assert!(!alice_clone.branch_exists(&branch).unwrap());

    let alice = config("alice", WorkflowMode::Pr);
    let merged = Board::new(&alice_clone, &alice)
        .merge(&id, &BranchOwner::new("bob", None))
        .unwrap();
    assert_eq!(merged.branch, branch);
    assert_eq!(merged.item.status, ItemStatus::Claimed);
    assert_eq!(merged.item.claimed_by.as_deref(), Some("bob"));
    assert!(merged.warnings.is_empty(), "{:?}", merged.warnings);
    assert_eq!(upstream.item(MAIN, &id).unwrap().status, ItemStatus::Claimed);
    assert_eq!(alice_clone.current_branch().unwrap(), MAIN);

    // A rig whose fork has no such branch gets a clear error.
    let err = Board::new(&alice_clone, &alice)
        .merge(&id, &BranchOwner::new("bob", Some("bob-labs".into())))
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::Store(_)));
}

#[test]
fn merge_with_change_requests_warns_but_merges() {
    let upstream = MemoryRemote::new();
    let fork = MemoryRemote::new();
    let clone = MemoryStore::with_fork(&upstream, &fork);
    let github = FakeGitHub::new();
    github.seed_repo(&RepoRef::new("hop", "commons"));
    github.seed_repo(&RepoRef::new("bob", "commons"));
    let provider = GitHubProvider::with_transport(github.clone());

    let bob = config("bob", WorkflowMode::Pr);
    let board = Board::new(&clone, &bob).with_provider(Some(&provider));
    let id = board.post(NewItem::new("New idea")).unwrap().item.id;
    board.open_review(&id).unwrap();

    github.set_user("carol");
    board
        .submit_review(
            &id,
            &board.own_branch(),
            ReviewEvent::RequestChanges,
            "needs a design",
        )
        .unwrap();
    github.fail_on("DELETE");

    let merged = board.merge(&id, &board.own_branch()).unwrap();
    assert_eq!(merged.item.status, ItemStatus::Open);
    assert!(upstream.item(MAIN, &id).is_some());
    let messages: Vec<String> = merged.warnings.iter().map(|w| w.to_string()).collect();
    assert!(messages.iter().any(|m| m.contains("change requests from carol")));
    assert!(messages.iter().any(|m| m.contains("no approvals")));
    assert!(merged
        .warnings
        .iter()
        .any(|w| w.class == ErrorClass::ReviewClose));
}

#[test]
fn reviews_stay_local_with_no_push() {
    let store = MemoryStore::new();
    let bob = config("bob", WorkflowMode::Pr);
    let board = Board::new(&store, &bob).with_options(offline());
    let id = board.post(NewItem::new("Offline")).unwrap().item.id;

    let outcome = board.open_review(&id).unwrap();
    assert!(outcome.pr.is_none());
    assert_eq!(outcome.branch, format!("wl/bob/{}", id));
    assert!(board
        .submit_review(&id, &board.own_branch(), ReviewEvent::Approve, "")
        .unwrap()
        .is_none());
}
