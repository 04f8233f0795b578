use std::process::ExitCode;

use clap::Parser;

use tgup::cli::{Cli, Command};
use tgup::commands;
use tgup::tgup_core::domain::SendKind;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::SendText(args) => commands::send::run_send_text(args),
        Command::SendImages(args) => commands::send::run_send(args, &[SendKind::Image], "send-images"),
        Command::SendDocument(args) => {
            commands::send::run_send(args, &[SendKind::Document], "send-document")
        }
        Command::SendVideo(args) => commands::send::run_send(args, &[SendKind::Video], "send-video"),
        Command::SendAudio(args) => commands::send::run_send(args, &[SendKind::Audio], "send-audio"),
        Command::SendMixed(args) => commands::send::run_send(args, &SendKind::ALL, "send-mixed"),
        Command::Watch(args) => commands::watch::run_watch(args),
        Command::Version => {
            println!("tgup {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
