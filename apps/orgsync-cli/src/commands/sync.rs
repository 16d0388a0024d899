//! Sync command - Reconcile the catalog with the organisation source

use crate::config::Config;
use crate::error::CliResult;
use clap::Args;
use orgsync_client::auth::CatalogAuth;
use orgsync_client::catalog::{DataspotClient, DataspotConfig};
use orgsync_client::retry::RetryPolicy;
use orgsync_client::OdsClient;
use orgsync_mapping::{MappingStore, MappingTable};
use orgsync_reconcile::{ReconciliationHandler, SyncOptions};

/// Base delay between retries of a failed call.
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Arguments for the sync command
#[derive(Args)]
pub struct SyncArgs {
    /// Compute and report changes without writing to the catalog
    #[arg(long)]
    pub dry_run: bool,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute one reconciliation run. Returns the exit code of its status.
pub async fn execute(args: SyncArgs, config: &Config) -> CliResult<i32> {
    let retry = RetryPolicy::new(config.max_retries, RETRY_BASE_DELAY_MS);
    let catalog = DataspotClient::new(
        DataspotConfig {
            base_url: config.dataspot_base_url.clone(),
            database: config.dataspot_database.clone(),
            scheme: config.dataspot_scheme.clone(),
            timeout: config.timeout,
        },
        CatalogAuth::bearer(config.dataspot_token.clone()),
        retry.clone(),
    )?;
    let source = OdsClient::new(
        config.ods_base_url.clone(),
        config.ods_dataset_id.clone(),
        config.timeout,
        retry,
    )?;

    let mut mapping = MappingStore::open(
        &config.mapping_dir,
        MappingTable::ORG_UNITS,
        &config.dataspot_database,
        &config.dataspot_scheme_short,
    );

    let options = SyncOptions::new(config.dataspot_scheme.clone())
        .with_page_size(config.ods_page_size)
        .with_dry_run(args.dry_run);
    let summary = ReconciliationHandler::new(&source, &catalog, &mut mapping, options)
        .run()
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.report());
    }
    Ok(summary.status.exit_code())
}
