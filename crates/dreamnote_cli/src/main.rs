//! CLI smoke and inspection entry point.
//!
//! # Responsibility
//! - Verify `dreamnote_core` linkage with deterministic output.
//! - List one owner's local thoughts from an existing database file.
//!
//! Usage: `dreamnote_cli [<db_path> <owner_id>]`

use dreamnote_core::{open_shared_db, LocalStore, SqliteLocalStore};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("dreamnote_core ping={}", dreamnote_core::ping());
    println!("dreamnote_core version={}", dreamnote_core::core_version());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => ExitCode::SUCCESS,
        [db_path, owner_id] => match list_thoughts(db_path, owner_id) {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("error: {message}");
                ExitCode::FAILURE
            }
        },
        _ => {
            eprintln!("usage: dreamnote_cli [<db_path> <owner_id>]");
            ExitCode::from(2)
        }
    }
}

fn list_thoughts(db_path: &str, owner_id: &str) -> Result<(), String> {
    let conn = open_shared_db(db_path).map_err(|err| err.to_string())?;
    let store = SqliteLocalStore::try_new(conn, owner_id).map_err(|err| err.to_string())?;
    let thoughts = store.get_all().map_err(|err| err.to_string())?;
    let links = store.links().map_err(|err| err.to_string())?;

    println!("owner={owner_id} thoughts={} links={}", thoughts.len(), links.len());
    for thought in thoughts {
        let tags: Vec<&str> = thought.tags.iter().map(|tag| tag.as_str()).collect();
        println!(
            "{}\t{}\t{}\t{}\t[{}]{}",
            thought.timestamp.to_rfc3339(),
            thought.id,
            thought.dominant_emotion(),
            thought.title,
            tags.join(","),
            if thought.pinned { "\tpinned" } else { "" }
        );
    }
    Ok(())
}
