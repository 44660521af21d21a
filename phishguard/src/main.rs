use colored::Colorize;
use commands::command_argument_builder;
use phishguard::handlers::{
    handle_check, handle_keygen, handle_pubkey, handle_verify, handle_warm,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    // Library crates log through tracing; RUST_LOG overrides the default
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let chosen_command = command_argument_builder().get_matches();

    let result = match chosen_command.subcommand() {
        Some(("check", primary_command)) => handle_check(primary_command).await,
        Some(("warm", primary_command)) => handle_warm(primary_command).await,
        Some(("verify", primary_command)) => handle_verify(primary_command),
        Some(("pubkey", primary_command)) => handle_pubkey(primary_command),
        Some(("keygen", primary_command)) => handle_keygen(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
