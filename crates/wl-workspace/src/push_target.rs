// push_target.rs — Which remotes a mutation is pushed to.

use wl_board::WorkItem;

use crate::config::WorkflowMode;
use crate::location::ItemLocation;

/// Where the mutation was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushScope {
    /// On the per-item review branch.
    Branch(String),
    /// On local main.
    Main,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushTarget {
    pub upstream: bool,
    pub origin: bool,
    pub hint: Option<String>,
}

impl PushTarget {
    pub fn both() -> Self {
        Self {
            upstream: true,
            origin: true,
            hint: None,
        }
    }

    pub fn origin_only(hint: Option<String>) -> Self {
        Self {
            upstream: false,
            origin: true,
            hint,
        }
    }

    pub fn nothing(hint: Option<String>) -> Self {
        Self {
            upstream: false,
            origin: false,
            hint,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.upstream && !self.origin
    }
}

/// Decide the push target for a mutation.
///
/// `post` is the item row after the mutation, when known.
pub fn resolve(
    mode: WorkflowMode,
    scope: &PushScope,
    location: &ItemLocation,
    post: Option<&WorkItem>,
) -> PushTarget {
    match (mode, scope) {
        (WorkflowMode::WildWest, _) => PushTarget::both(),
        (WorkflowMode::Pr, PushScope::Branch(branch)) => PushTarget::origin_only(Some(format!(
            "pushed {} to your fork; run `wl review {}` to open it for review",
            branch, location.item_id
        ))),
        (WorkflowMode::Pr, PushScope::Main) => {
            if post.is_some_and(|item| location.converged_with(item)) {
                PushTarget::nothing(Some(format!(
                    "canonical already shows {} as {}; nothing to push",
                    location.item_id,
                    location.canonical
                )))
            } else if location.fork_diverges() {
                PushTarget::origin_only(Some(format!(
                    "your fork differs from canonical for {}; pushed to your fork only. \
                     Ask a maintainer of the commons to apply the change, or open a review \
                     with `wl review {}`",
                    location.item_id, location.item_id
                )))
            } else {
                PushTarget::both()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{BranchObservation, Observation};
    use chrono::{Duration, Utc};
    use wl_board::{ItemStatus, NewItem};

    fn present(status: ItemStatus) -> Observation {
        Observation::Present {
            status,
            updated_at: Utc::now(),
        }
    }

    fn seen(item: &WorkItem) -> Observation {
        Observation::Present {
            status: item.status,
            updated_at: item.updated_at,
        }
    }

    fn row(status: ItemStatus) -> WorkItem {
        let mut item = WorkItem::post(NewItem::new("task"), "alice", Utc::now()).unwrap();
        item.id = "w-1".into();
        item.status = status;
        item
    }

    fn loc(canonical: Observation, fork: Observation) -> ItemLocation {
        ItemLocation {
            item_id: "w-1".into(),
            canonical,
            canonical_ref: "upstream/main".into(),
            fork,
            branches: vec![BranchObservation {
                branch: "wl/bob/w-1".into(),
                observation: present(ItemStatus::Claimed),
                local_only: true,
            }],
        }
    }

    #[test]
    fn wild_west_always_pushes_both() {
        let cases = [
            loc(present(ItemStatus::Open), present(ItemStatus::Claimed)),
            loc(Observation::Unknown, Observation::Unknown),
            loc(present(ItemStatus::Completed), Observation::Absent),
        ];
        let completed = row(ItemStatus::Completed);
        for location in &cases {
            for scope in [PushScope::Main, PushScope::Branch("wl/bob/w-1".into())] {
                let target = resolve(WorkflowMode::WildWest, &scope, location, Some(&completed));
                assert_eq!(target, PushTarget::both());
            }
        }
    }

    #[test]
    fn pr_branch_pushes_origin_only() {
        let claimed = row(ItemStatus::Claimed);
        for location in [
            loc(present(ItemStatus::Open), present(ItemStatus::Open)),
            loc(Observation::Absent, present(ItemStatus::Claimed)),
        ] {
            let target = resolve(
                WorkflowMode::Pr,
                &PushScope::Branch("wl/bob/w-1".into()),
                &location,
                Some(&claimed),
            );
            assert!(target.origin && !target.upstream);
        }
    }

    #[test]
    fn pr_main_skips_push_when_canonical_has_the_same_row() {
        let completed = row(ItemStatus::Completed);
        let location = loc(seen(&completed), present(ItemStatus::InReview));
        let target = resolve(WorkflowMode::Pr, &PushScope::Main, &location, Some(&completed));
        assert!(target.is_empty());
        assert!(target.hint.is_some());
    }

    #[test]
    fn pr_main_pushes_field_edits_that_keep_the_status() {
        let before = row(ItemStatus::Open);
        let location = loc(seen(&before), seen(&before));
        let mut edited = before.clone();
        edited.priority = 0;
        edited.updated_at = before.updated_at + Duration::seconds(1);

        let target = resolve(WorkflowMode::Pr, &PushScope::Main, &location, Some(&edited));
        assert_eq!(target, PushTarget::both());
    }

    #[test]
    fn pr_main_pushes_fork_only_when_it_diverges() {
        let location = loc(present(ItemStatus::Open), present(ItemStatus::Claimed));
        let withdrawn = row(ItemStatus::Withdrawn);
        let target = resolve(WorkflowMode::Pr, &PushScope::Main, &location, Some(&withdrawn));
        assert!(target.origin && !target.upstream);
        assert!(target.hint.unwrap().contains("maintainer"));
    }

    #[test]
    fn pr_main_pushes_both_otherwise() {
        let location = loc(present(ItemStatus::Open), present(ItemStatus::Open));
        let withdrawn = row(ItemStatus::Withdrawn);
        let target = resolve(WorkflowMode::Pr, &PushScope::Main, &location, Some(&withdrawn));
        assert_eq!(target, PushTarget::both());
    }
}
