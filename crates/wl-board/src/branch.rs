// branch.rs — Per-item branch naming.
//
// A rig's in-flight work on an item lives on `wl/<rig-handle>/<item-id>`.
// The name is never stored; it is recomputed wherever it is needed and is
// the join key between an item and its review shell, so the format is
// wire-visible and must not change.

/// Prefix shared by every per-item branch.
pub const BRANCH_PREFIX: &str = "wl/";

/// The branch a rig uses for its work on an item.
pub fn branch_name(rig_handle: &str, item_id: &str) -> String {
    format!("{}{}/{}", BRANCH_PREFIX, rig_handle, item_id)
}

/// Split a per-item branch into `(rig_handle, item_id)`.
///
/// Accepts remote-tracking forms such as `origin/wl/alice/w-1` or
/// `remotes/origin/wl/alice/w-1` by looking for the `wl/` segment.
pub fn parse_branch(branch: &str) -> Option<(&str, &str)> {
    let start = if branch.starts_with(BRANCH_PREFIX) {
        0
    } else {
        branch.find("/wl/").map(|i| i + 1)?
    };
    let rest = &branch[start + BRANCH_PREFIX.len()..];
    let (rig, item) = rest.split_once('/')?;
    if rig.is_empty() || item.is_empty() || item.contains('/') {
        return None;
    }
    Some((rig, item))
}

/// The item id a per-item branch refers to.
pub fn extract_wanted_id(branch: &str) -> Option<&str> {
    parse_branch(branch).map(|(_, item)| item)
}

/// The rig handle a per-item branch belongs to.
pub fn extract_rig(branch: &str) -> Option<&str> {
    parse_branch(branch).map(|(rig, _)| rig)
}

/// True if `branch` is some rig's branch for `item_id`.
pub fn is_item_branch(branch: &str, item_id: &str) -> bool {
    extract_wanted_id(branch) == Some(item_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_format_is_exact() {
        assert_eq!(branch_name("r1", "w-abc123"), "wl/r1/w-abc123");
    }

    #[test]
    fn extract_wanted_id_from_branch() {
        assert_eq!(extract_wanted_id("wl/r1/w-abc123"), Some("w-abc123"));
        assert_eq!(extract_rig("wl/r1/w-abc123"), Some("r1"));
    }

    #[test]
    fn round_trips_for_slash_free_parts() {
        for (rig, item) in [("a", "w-1"), ("rig-with-dash", "w-0123456789"), ("R_2", "x")] {
            let name = branch_name(rig, item);
            assert_eq!(parse_branch(&name), Some((rig, item)));
        }
    }

    #[test]
    fn remote_tracking_forms_parse() {
        assert_eq!(extract_wanted_id("origin/wl/bob/w-9"), Some("w-9"));
        assert_eq!(extract_wanted_id("remotes/upstream/wl/bob/w-9"), Some("w-9"));
    }

    #[test]
    fn non_item_branches_do_not_parse() {
        assert_eq!(parse_branch("main"), None);
        assert_eq!(parse_branch("wl/onlyrig"), None);
        assert_eq!(parse_branch("wl//w-1"), None);
        assert_eq!(parse_branch("wl/a/b/c"), None);
        assert!(!is_item_branch("wl/a/w-2", "w-1"));
    }
}
