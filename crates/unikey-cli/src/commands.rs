//! Subcommand handling.

use std::sync::Arc;

use clap::Subcommand;
use serde_json::{json, Value as Json};
use unikey_core::fingerprint::fingerprint_of;
use unikey_core::{KeyedStore, Reservation, Value};

use crate::error::CliError;

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reserve identifiers in a namespace, all or none.
    Reserve {
        /// Namespace, e.g. "Ticket".
        kind: String,
        /// Identifiers to reserve.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Release reserved identifiers.
    Release {
        /// Namespace.
        kind: String,
        /// Identifiers to release.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Check whether an identifier is reserved.
    Check {
        /// Namespace.
        kind: String,
        /// Identifier.
        id: String,
    },

    /// Print the fingerprint of an ordered list of fields.
    Fingerprint {
        /// Field as name=value, in constraint order. Repeatable.
        #[arg(short, long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
}

/// Run a command and return its JSON output.
pub fn execute<S: KeyedStore + ?Sized>(store: &Arc<S>, command: Command) -> Result<Json, CliError> {
    match command {
        Command::Reserve { kind, ids } => {
            let outcome = Reservation::new(store.clone(), &kind).reserve_batch(&ids)?;
            if outcome.reserved {
                tracing::info!(kind = %kind, count = ids.len(), "reserved");
            }
            Ok(json!({
                "kind": kind,
                "reserved": outcome.reserved,
                "failed": outcome.failed,
            }))
        }

        Command::Release { kind, ids } => {
            Reservation::new(store.clone(), &kind).release(&ids)?;
            Ok(json!({ "kind": kind, "released": ids }))
        }

        Command::Check { kind, id } => {
            let reserved = Reservation::new(store.clone(), &kind).is_reserved(&id)?;
            Ok(json!({ "kind": kind, "id": id, "reserved": reserved }))
        }

        Command::Fingerprint { fields } => fingerprint(&fields),
    }
}

/// Fingerprint of `name=value` fields. Needs no store.
pub fn fingerprint(fields: &[String]) -> Result<Json, CliError> {
    let values = parse_fields(fields)?;
    Ok(json!({ "fingerprint": fingerprint_of(&values) }))
}

/// Parse `name=value` arguments, keeping their order.
pub fn parse_fields(fields: &[String]) -> Result<Vec<(String, Value)>, CliError> {
    let mut values: Vec<(String, Value)> = Vec::with_capacity(fields.len());
    for field in fields {
        let (name, raw) = field
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| CliError::InvalidField(field.clone()))?;
        if values.iter().any(|(existing, _)| existing == name) {
            return Err(CliError::DuplicateField(name.to_string()));
        }
        values.push((name.to_string(), parse_value(raw)));
    }
    Ok(values)
}

/// Integers and booleans are typed, `null` is null, anything else is a string.
fn parse_value(raw: &str) -> Value {
    if raw == "null" {
        return Value::Null;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int64(i);
    }
    Value::String(raw.to_string())
}
