//! Mapping command - Inspect the external-id to catalog-id table

use crate::config::Config;
use crate::error::{CliError, CliResult};
use clap::{Args, Subcommand};
use orgsync_mapping::{MappingEntry, MappingStore, MappingTable};
use serde::Serialize;

/// Arguments for the mapping command
#[derive(Args)]
pub struct MappingArgs {
    #[command(subcommand)]
    pub command: MappingCommand,
}

#[derive(Subcommand)]
pub enum MappingCommand {
    /// List all entries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the entry for one external id
    Get {
        external_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    external_id: &'a str,
    #[serde(flatten)]
    entry: &'a MappingEntry,
}

pub fn execute(args: MappingArgs, config: &Config) -> CliResult<i32> {
    let store = MappingStore::open(
        &config.mapping_dir,
        MappingTable::ORG_UNITS,
        &config.dataspot_database,
        &config.dataspot_scheme_short,
    );

    match args.command {
        MappingCommand::List { json } => {
            let entries: Vec<EntryOutput<'_>> = store
                .all()
                .iter()
                .map(|(external_id, entry)| EntryOutput { external_id, entry })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for output in &entries {
                    print_entry(output);
                }
                eprintln!("{} entries in {}", entries.len(), store.path().display());
            }
        }
        MappingCommand::Get { external_id, json } => {
            let entry = store
                .get(&external_id)
                .ok_or_else(|| CliError::NotFound(format!("no mapping for '{external_id}'")))?;
            let output = EntryOutput {
                external_id: &external_id,
                entry,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_entry(&output);
            }
        }
    }
    Ok(0)
}

fn print_entry(output: &EntryOutput<'_>) {
    println!(
        "{}\t{}\t{}\t{}",
        output.external_id,
        output.entry.kind,
        output.entry.internal_id,
        output.entry.parent_business_key.as_deref().unwrap_or("")
    );
}
