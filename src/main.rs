use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;

use themesync::logging::init_tracing;
use themesync::{commands, Config, SyncError};

fn cli() -> Command {
	Command::new("themesync")
		.version("0.1.0")
		.about("Mirror a theme folder, keep it in sync and diff it against Atlas UI")
		.subcommand_required(true)
		.arg_required_else_help(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(
			Arg::new("strict")
				.long("strict")
				.global(true)
				.action(ArgAction::SetTrue)
				.help("Stop syncing on the first failed copy or removal"),
		)
		.arg(
			Arg::new("lenient")
				.long("lenient")
				.global(true)
				.conflicts_with("strict")
				.action(ArgAction::SetTrue)
				.help("Log failed copies and removals and keep syncing"),
		)
		.subcommand(Command::new("start").visible_alias("sync").about("Copy the source folder, then keep it in sync"))
		.subcommand(Command::new("copy").about("Copy the source folder"))
		.subcommand(Command::new("check").about("Check the Atlas UI version"))
		.subcommand(Command::new("atlasui").about("Download the Atlas UI source"))
		.subcommand(
			Command::new("compare").about("Compare the theme to Atlas UI").arg(
				Arg::new("list")
					.short('l')
					.long("list")
					.action(ArgAction::SetTrue)
					.help("Print the differences instead of writing the report"),
			),
		)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();

	let config_file = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(config_file.as_deref())?;
	if matches.get_flag("strict") {
		config.strict = true;
	} else if matches.get_flag("lenient") {
		config.strict = false;
	}
	init_tracing(&config.log_level);

	let result: Result<(), SyncError> = match matches.subcommand() {
		Some(("start", _)) => commands::sync(&config).await.map(|_| ()),
		Some(("copy", _)) => commands::copy(&config).await.map(|_| ()),
		Some(("check", _)) => commands::check(&config).map(|_| ()),
		Some(("atlasui", _)) => commands::atlasui(&config).await.map(|_| ()),
		Some(("compare", sub)) => commands::compare(&config, sub.get_flag("list")).await.map(|_| ()),
		_ => Ok(()),
	};

	match result {
		Err(SyncError::PreconditionMissing { path, hint }) => {
			println!("{} does not exist. {}", path.display(), hint);
			Ok(())
		}
		other => Ok(other?),
	}
}


// vim: ts=4
