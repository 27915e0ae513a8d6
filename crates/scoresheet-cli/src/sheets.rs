use std::{fs, io::Write};

use color_eyre::{eyre::eyre, Result};
use scoresheet_core::{
    sheets::{to_iso_millis, MatchData},
    storage::KeyValueStore,
};
use scoresheet_sheets::{migrate::migrate_match_data, MatchSheetRepository};
use serde_json::Value;

use crate::{cli::SheetCommand, config, storage};

/// Execute a scoresheet subcommand using the encrypted store.
pub async fn handle(cmd: SheetCommand, config: &config::Config) -> Result<()> {
    let mut repo = MatchSheetRepository::new(storage::store_from_config(config)?);
    let stdout = std::io::stdout();
    execute(&mut repo, cmd, &mut stdout.lock()).await
}

async fn execute<S: KeyValueStore, W: Write>(
    repo: &mut MatchSheetRepository<S>,
    cmd: SheetCommand,
    out: &mut W,
) -> Result<()> {
    repo.load_sheets()
        .await
        .map_err(|e| eyre!("Unable to load the scoresheets: {e:#}"))?;

    match cmd {
        SheetCommand::List => {
            if repo.sheets().is_empty() {
                writeln!(out, "No scoresheets yet. Create one with `scoresheet new`.")?;
                return Ok(());
            }
            for sheet in repo.sheets() {
                writeln!(
                    out,
                    "{} [{}] {}",
                    sheet.id,
                    to_iso_millis(&sheet.updated_at),
                    sheet.data.title().as_deref().unwrap_or("(untitled)")
                )?;
            }
        }
        SheetCommand::New => {
            let sheet = repo
                .save_sheet(None, MatchData::default())
                .await
                .map_err(save_failed)?;
            writeln!(out, "Created scoresheet {}", sheet.id)?;
        }
        SheetCommand::Show { id } => {
            let sheet = repo
                .get_sheet(&id)
                .ok_or_else(|| eyre!("No scoresheet with id {id}"))?;
            let mut data = sheet.data.clone();
            data.signatures = data.signatures.validated();
            writeln!(out, "{}", serde_json::to_string_pretty(&data)?)?;
        }
        SheetCommand::Import { file, id } => {
            let raw = fs::read_to_string(&file)?;
            let value: Value = serde_json::from_str(&raw)?;
            let data = migrate_match_data(value)?;
            let sheet = repo
                .save_sheet(id.as_deref(), data)
                .await
                .map_err(save_failed)?;
            writeln!(out, "Saved scoresheet {}", sheet.id)?;
        }
        SheetCommand::Export { id } => {
            let sheet = repo
                .get_sheet(&id)
                .ok_or_else(|| eyre!("No scoresheet with id {id}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(sheet)?)?;
        }
        SheetCommand::Delete { id } => {
            let removed = repo
                .delete_sheet(&id)
                .await
                .map_err(|e| eyre!("Unable to delete the scoresheet: {e:#}"))?;
            if removed {
                writeln!(out, "Deleted scoresheet {id}")?;
            } else {
                writeln!(out, "No scoresheet with id {id}")?;
            }
        }
    }

    Ok(())
}

fn save_failed(err: anyhow::Error) -> color_eyre::Report {
    eyre!("Unable to save the scoresheet: {err:#}")
}
