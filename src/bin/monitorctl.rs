//! Process control for the monitor daemon: start/stop/status/logs backed by
//! a PID file and the daemon's log file under the storage directory.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;
use std::time::Duration;

use meta_ads_monitor::constants::{LOG_FILE, PID_FILE};

#[derive(Parser)]
#[command(name = "monitorctl", version, about = "Process control for the Meta Ads monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the monitor in the background
    Start,
    /// Stop the running monitor
    Stop,
    /// Restart the monitor
    Restart,
    /// Show whether the monitor is running
    Status,
    /// Print the last lines of the log
    Logs {
        #[arg(long, default_value_t = 50)]
        lines: usize,
    },
    /// Stream the log as it grows
    Follow,
}

fn storage_dir() -> PathBuf {
    env::var("MONITOR_STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("storage"))
}

fn read_pid(pid_path: &Path) -> Option<u32> {
    fs::read_to_string(pid_path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    // signal 0 probes for existence without touching the process
    ProcessCommand::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn start(dir: &Path) -> Result<()> {
    let pid_path = dir.join(PID_FILE);
    if let Some(pid) = read_pid(&pid_path) {
        if process_alive(pid) {
            bail!("monitor already running (pid {pid})");
        }
    }

    fs::create_dir_all(dir)?;
    let monitor_bin = env::current_exe()?
        .parent()
        .context("cannot locate binary directory")?
        .join("meta-ads-monitor");

    // the daemon writes its own log file; the inherited streams are unused
    let child = ProcessCommand::new(&monitor_bin)
        .arg("--start")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch {}", monitor_bin.display()))?;

    fs::write(&pid_path, child.id().to_string())?;
    println!("✅ monitor started (pid {})", child.id());
    Ok(())
}

fn stop(dir: &Path) -> Result<()> {
    let pid_path = dir.join(PID_FILE);
    let Some(pid) = read_pid(&pid_path) else {
        bail!("monitor is not running (no pid file)");
    };

    if !process_alive(pid) {
        fs::remove_file(&pid_path).ok();
        bail!("monitor is not running (stale pid {pid})");
    }

    ProcessCommand::new("kill")
        .arg(pid.to_string())
        .status()
        .context("failed to signal the monitor")?;

    for _ in 0..50 {
        if !process_alive(pid) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    fs::remove_file(&pid_path).ok();
    println!("✅ monitor stopped");
    Ok(())
}

fn status(dir: &Path) -> Result<()> {
    match read_pid(&dir.join(PID_FILE)) {
        Some(pid) if process_alive(pid) => println!("🟢 running (pid {pid})"),
        Some(pid) => println!("🔴 not running (stale pid file, pid {pid})"),
        None => println!("🔴 not running"),
    }
    Ok(())
}

fn logs(dir: &Path, lines: usize) -> Result<()> {
    let log_path = dir.join(LOG_FILE);
    let raw = fs::read_to_string(&log_path)
        .with_context(|| format!("cannot read {}", log_path.display()))?;

    let all: Vec<&str> = raw.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(())
}

fn follow(dir: &Path) -> Result<()> {
    let log_path = dir.join(LOG_FILE);
    let mut file = fs::File::open(&log_path)
        .with_context(|| format!("cannot open {}", log_path.display()))?;
    file.seek(SeekFrom::End(0))?;
    let mut reader = BufReader::new(file);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            thread::sleep(Duration::from_millis(500));
        } else {
            print!("{line}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let dir = storage_dir();

    match cli.command {
        Command::Start => start(&dir),
        Command::Stop => stop(&dir),
        Command::Restart => {
            if let Err(e) = stop(&dir) {
                eprintln!("{e}");
            }
            thread::sleep(Duration::from_secs(1));
            start(&dir)
        }
        Command::Status => status(&dir),
        Command::Logs { lines } => logs(&dir, lines),
        Command::Follow => follow(&dir),
    }
}
