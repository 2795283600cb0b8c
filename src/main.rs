//! Screensaver Enforcer - keeps a Fire TV's screen-off timeout pinned over adb
//!
//! - `start` runs the enforcement loop in the foreground, optionally with a
//!   tray icon
//! - `stop` asks a running loop to finish its current step and exit
//! - `check`, `diagnostics` and `enable-screensaver` are one-shot helpers

mod cli;
mod control;
mod device;
mod enforcer;
mod host;
mod logging;
mod settings;
mod tray;

use clap::Parser;
use cli::{exit_codes, AppContext, Cli, Commands};
use enforcer::LoopExit;

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.json_output) {
        eprintln!("Failed to initialize logging: {}", e);
        return exit_codes::UNEXPECTED_FAILURE;
    }

    let ctx = AppContext::from_cli(&cli);
    tracing::debug!(
        settings = %ctx.settings.path().display(),
        tool_dir = %ctx.tools.tool_dir.display(),
        "Resolved paths"
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            return exit_codes::UNEXPECTED_FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Start(args) => {
            if args.tray {
                #[cfg(windows)]
                hide_owned_console_window();
            }

            rt.block_on(cli::start::run(args, &ctx)).map(|exit| match exit {
                LoopExit::Cancelled => exit_codes::SUCCESS,
                LoopExit::Faulted(_) => exit_codes::UNEXPECTED_FAILURE,
            })
        }
        Commands::Stop => cli::stop::run(&ctx).map(|_| exit_codes::SUCCESS),
        Commands::Check => cli::check::run(&ctx).map(|()| exit_codes::SUCCESS),
        Commands::Diagnostics(args) => rt
            .block_on(cli::diagnostics::run(args, &ctx))
            .map(|()| exit_codes::SUCCESS),
        Commands::EnableScreensaver(args) => rt
            .block_on(cli::diagnostics::run_enable(args, &ctx))
            .map(|()| exit_codes::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            categorize_error(&e)
        }
    }
}

/// Map an error to the process exit code by its type
fn categorize_error(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<settings::ValidationError>().is_some() {
        exit_codes::VALIDATION_FAILED
    } else if e.downcast_ref::<host::ToolError>().is_some() {
        exit_codes::TOOL_MISSING
    } else {
        exit_codes::UNEXPECTED_FAILURE
    }
}

/// Hide the console when it belongs to this process alone, i.e. when the
/// binary was launched from Explorer rather than a terminal.
#[cfg(windows)]
fn hide_owned_console_window() {
    use windows::Win32::System::Console::{GetConsoleProcessList, GetConsoleWindow};
    use windows::Win32::UI::WindowsAndMessaging::{ShowWindow, SW_HIDE};

    unsafe {
        let mut pids = [0u32; 2];
        if GetConsoleProcessList(&mut pids) != 1 {
            return;
        }
        let console = GetConsoleWindow();
        if !console.is_invalid() {
            let _ = ShowWindow(console, SW_HIDE);
        }
    }
}
