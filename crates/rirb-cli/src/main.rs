mod cli;
mod configfile;

use std::io::Write as _;

use clap::Parser;
use eyre::{eyre, Result};
use uuid::Uuid;

use cli::Cli;
use rirb_core::config::{self, Config};
use rirb_core::driver::SyncToolDriver;
use rirb_core::log::Log;
use rirb_core::orchestrator::{Orchestrator, RunOptions};
use rirb_core::shell::{self, HookPoint};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if cli.new {
        let uuid = Uuid::new_v4().to_string();
        configfile::write_template(&cli.configpath, &uuid)?;
        println!("wrote a new config to {}", cli.configpath.display());
        return Ok(());
    }

    let file = configfile::load(&cli.configpath)?;
    let overrides = configfile::parse_overrides(&cli.overrides)?;
    let config_dir = cli
        .configpath
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let cfg = Config::from_raw(file, &overrides, config_dir, None, env!("CARGO_PKG_VERSION"))
        .map_err(|e| eyre!("{e}"))?;

    let tmpdir = std::env::temp_dir().join(format!("rirb-{}", cfg.uuid));
    let log = Log::new(&tmpdir, cli.debug).map_err(|e| eyre!("{e}"))?;

    let run_result = run(&cfg, &log, &cli).await;

    match &run_result {
        Ok(()) => log.cleanup(),
        Err(e) if cli.debug => log.log(format!("fatal: {e:?}")),
        Err(e) => log.log(format!("fatal: {e}")),
    }

    run_result.map_err(|e| eyre!("{e}"))
}

async fn run(cfg: &Config, log: &Log, cli: &Cli) -> Result<()> {
    shell::run_hook(HookPoint::Pre, &cfg.pre_shell, cfg.stop_on_shell_error, log)
        .await
        .map_err(|e| eyre!("{e}"))?;

    let cache_dir = config::cache_dir().map_err(|e| eyre!("{e}"))?;
    let driver = SyncToolDriver::new(cfg.rclone_exe.clone(), cfg.rclone_flags.clone(), cfg.rclone_env.clone(), cfg.metadata);
    let orchestrator = Orchestrator::new(cfg, driver, log, cache_dir);

    let mut opts = RunOptions {
        init: cli.init,
        dst_list: cli.dst_list,
        dry_run: cli.dry_run,
        interactive: cli.interactive,
        debug: cli.debug,
    };

    if cli.interactive && !opts.dry_run {
        let preview = orchestrator
            .run(RunOptions { dry_run: true, ..opts.clone() })
            .await
            .map_err(|e| eyre!("{e}"))?;
        println!(
            "plan: {} new, {} modified, {} deleted, {} renamed ({} bytes)",
            preview.new_files, preview.modified_files, preview.deleted_files, preview.renamed_files, preview.bytes_transferred
        );
        if !confirm("proceed? [y/N] ")? {
            opts.dry_run = true;
        }
    }

    let summary = orchestrator.run(opts).await.map_err(|e| eyre!("{e}"))?;

    let post_shell = substitute_summary(&cfg.post_shell, &summary);
    shell::run_hook(HookPoint::Post, &post_shell, cfg.stop_on_shell_error, log)
        .await
        .map_err(|e| eyre!("{e}"))?;

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn substitute_summary(template: &str, summary: &rirb_core::orchestrator::RunSummary) -> String {
    template
        .replace("{new}", &summary.new_files.to_string())
        .replace("{modified}", &summary.modified_files.to_string())
        .replace("{deleted}", &summary.deleted_files.to_string())
        .replace("{renamed}", &summary.renamed_files.to_string())
        .replace("{bytes}", &summary.bytes_transferred.to_string())
        .replace("{dry_run}", &summary.dry_run.to_string())
        .replace("{dst_list}", &summary.dst_list.to_string())
        .replace("{duration_secs}", &summary.duration.as_secs().to_string())
}
