pub mod board;
pub mod review;
pub mod session;
pub mod workspace;

use wl_board::BoardError;
use wl_review::ReviewError;
use wl_store::StoreError;
use wl_workspace::{Warning, WorkspaceError};

/// The `hint:` line for errors that have a concrete next step.
pub fn hint_for(err: &anyhow::Error) -> Option<String> {
    if let Some(e) = err.downcast_ref::<WorkspaceError>() {
        return e.hint();
    }
    if let Some(e) = err.downcast_ref::<StoreError>() {
        return e.hint().map(str::to_string);
    }
    if let Some(e) = err.downcast_ref::<ReviewError>() {
        return e.hint().map(str::to_string);
    }
    if let Some(BoardError::NotFound(_)) = err.downcast_ref::<BoardError>() {
        return Some("run `wl sync` to pick up recent items".to_string());
    }
    None
}

pub fn print_warnings(warnings: &[Warning]) {
    for w in warnings {
        eprintln!("warning: {}", w);
    }
}

/// Push progress from the database tool.
pub fn stderr_progress(line: &str) {
    eprintln!("  {}", line);
}
