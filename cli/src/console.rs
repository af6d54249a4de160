use bulk_upsert::{OutcomeKind, UpsertResult};
use colored::Colorize;

pub fn print_error_message(error_message: &str) {
    eprintln!("{}", error_message.red());
}

pub fn print_warn_message(warn_message: &str) {
    eprintln!("{}", warn_message.yellow());
}

pub fn print_success_message(success_message: &str) {
    println!("{}", success_message.green());
}

/// One line per outcome, e.g. `inserted: 3`.
pub fn outcome_summary<T>(result: &UpsertResult<T>) -> String {
    OutcomeKind::ALL
        .iter()
        .map(|kind| format!("{}: {}", kind, result.get(*kind).len()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_outcome_summary<T>(result: &UpsertResult<T>) {
    for line in outcome_summary(result).lines() {
        println!("{}", line.cyan());
    }
}
