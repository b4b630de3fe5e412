use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::amount::AmountParseError;
use crate::model::TransactionRecord;
use crate::tracker::Action;

/// Errors that can occur when reading action rows or writing history
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized action '{action}'")]
    UnrecognizedAction { line: usize, action: String },

    #[error("line {line}: {action} missing amount")]
    MissingAmount { line: usize, action: String },

    #[error("line {line}: {source}")]
    InvalidAmount {
        line: usize,
        source: AmountParseError,
    },

    #[error("failed to write history: {0}")]
    Write(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    action: String,
    amount: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    hash: String,
    kind: String,
    amount: String,
    status: String,
    block: Option<u64>,
    gas_used: Option<u64>,
    fee: Option<String>,
}

/// Read actions from a csv file with an `action,amount` header
pub fn read_actions(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Action, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let amount = || -> Result<Amount, CsvError> {
                let raw = row
                    .amount
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| CsvError::MissingAmount {
                        line,
                        action: row.action.clone(),
                    })?;
                raw.parse()
                    .map_err(|source| CsvError::InvalidAmount { line, source })
            };
            match row.action.as_str() {
                "mint" => Ok(Action::Mint(amount()?)),
                "burn" => Ok(Action::Burn(amount()?)),
                "faucet" => Ok(Action::Faucet),
                other => Err(CsvError::UnrecognizedAction {
                    line,
                    action: other.to_string(),
                }),
            }
        }))
}

/// Write transaction history as csv, in the order given
pub fn write_history<'a>(
    records: impl IntoIterator<Item = &'a TransactionRecord>,
    out: impl io::Write,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for record in records {
        let row = OutputRow {
            hash: record.hash.to_string(),
            kind: record.kind.to_string(),
            amount: record.amount.to_string(),
            status: record.status.to_string(),
            block: record.block_number(),
            gas_used: record.gas_used(),
            fee: record.fee().map(|fee| fee.to_string()),
        };
        writer.serialize(&row)?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
