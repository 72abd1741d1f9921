//! CLI smoke entry point for the org tree engine.
//!
//! # Responsibility
//! - Open (or create) an org tree database and print a tree as JSON.
//! - Seed a small demo organization on request.
//!
//! Usage: `orgtree_cli demo` or `orgtree_cli tree <node-id>`.
//! Environment: `ORGTREE_DB`, `ORGTREE_LOG_DIR`, `ORGTREE_LOG_LEVEL`.

use log::warn;
use orgtree_core::db::{open_db, open_db_in_memory};
use orgtree_core::{
    core_version, default_log_level, init_logging, parse_node_id, NewNode, NodeKind,
    OrgTreeService, SqliteNodeRepository,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("orgtree_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("ORGTREE_LOG_DIR") {
        let level =
            std::env::var("ORGTREE_LOG_LEVEL").unwrap_or_else(|_| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("orgtree_cli logging disabled: {err}");
        }
    }

    let conn = match std::env::var("ORGTREE_DB") {
        Ok(path) => open_db(path)?,
        Err(_) => open_db_in_memory()?,
    };
    let service = OrgTreeService::new(SqliteNodeRepository::try_new(&conn)?);

    let root_uuid = match args.first().map(String::as_str) {
        Some("demo") | None => {
            let root = service.create_node(NewNode::organization("Bank"))?;
            let audit = service.create_node(NewNode::child(
                NodeKind::Department,
                "Audit",
                root.node_uuid,
            ))?;
            service.create_node(NewNode::child(
                NodeKind::Employee,
                "Akshay",
                audit.node_uuid,
            ))?;
            root.node_uuid
        }
        Some("tree") => {
            let raw = args.get(1).ok_or("usage: orgtree_cli tree <node-id>")?;
            parse_node_id(raw)?
        }
        Some(other) => {
            warn!("event=cli_usage module=cli status=error command={other}");
            return Err(format!("unknown command `{other}`; expected demo|tree").into());
        }
    };

    let tree = service.get_tree(root_uuid)?;
    println!("orgtree_core version={}", core_version());
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}
