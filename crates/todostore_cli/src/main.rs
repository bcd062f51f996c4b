//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `todostore_core` linkage without any UI runtime.
//! - Run one create/complete/delete round against an in-memory store.

use std::process::ExitCode;
use todostore_core::{StoreResult, TodoDatabase, TodoDraft, TodoFilter, TODO_MODELS};

fn main() -> ExitCode {
    println!("todostore_core version={}", todostore_core::core_version());
    match run_smoke() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_smoke() -> StoreResult<()> {
    let db = TodoDatabase::open_in_memory(TODO_MODELS)?;

    let todo = db.create_or_update(TodoDraft::default())?;
    let key = todo.key()?;
    println!("created key={} title={}", key, todo.title()?);

    db.mark_complete_by_key(&key)?;
    println!(
        "complete={} incomplete={}",
        db.list(TodoFilter::Complete)?.len(),
        db.list(TodoFilter::Incomplete)?.len()
    );

    db.delete_by_key(&key)?;
    println!("remaining={} handle_valid={}", db.get_all()?.len()?, todo.is_valid());
    Ok(())
}
