use std::process;

use clap::Parser;
use log::debug;

use hostdb::cli::{Cli, Commands};
use hostdb::commands::{download, inspect, list};
use hostdb::config::Settings;
use hostdb::tools::Toolbox;
use hostdb::ui::Ui;

async fn run(cli: Cli, ui: Ui) -> anyhow::Result<i32> {
    let settings = Settings::from_env();

    match cli.command {
        Commands::Download(args) => {
            let settings = settings
                .with_output_dir(args.output.clone())
                .with_timeout_secs(args.timeout_secs);
            debug!("{:?}", settings);
            let toolbox = Toolbox::probe();
            download::download(&args, &settings, &toolbox, ui).await
        }
        Commands::List { database } => list::list(database, &settings, ui),
        Commands::Inspect { archive, database } => {
            inspect::inspect(&archive, database, &Toolbox::probe(), ui)
        }
    }
}

#[tokio::main]
async fn main() {
    // Usage errors exit 1 like any other invalid argument; help and version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.exit_code() == 0 { 0 } else { 1 };
            let _ = e.print();
            process::exit(code);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let ui = Ui::detect();
    let code = match run(cli, ui).await {
        Ok(code) => code,
        Err(e) => {
            ui.error(&format!("{:#}", e));
            1
        }
    };
    process::exit(code);
}
