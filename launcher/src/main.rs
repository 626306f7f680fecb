use anyhow::{Context, Result};
use clap::Parser;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;

const GRACE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
enum LauncherError {
    #[error("failed to start {program:?} from {path}: {source}")]
    Spawn {
        program: ProgramName,
        path: String,
        source: std::io::Error,
    },
    #[error("{0:?} exited unexpectedly with {1}")]
    Died(ProgramName, ExitStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramName {
    MockUpstream,
    Relay,
    ChatClient,
}

impl ProgramName {
    fn executable_name(&self) -> &'static str {
        match self {
            ProgramName::MockUpstream => "mock_upstream",
            ProgramName::Relay => "relay",
            ProgramName::ChatClient => "chat_client",
        }
    }

    fn get_executable(&self, bin_dir: &Path) -> PathBuf {
        bin_dir.join(self.executable_name())
    }
}

#[derive(Parser)]
#[clap(about = "Runs the relay with a local mock upstream and an interactive chat client")]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    relay_address: String,
    #[clap(long, default_value = "5000")]
    relay_port: u16,
    #[clap(long, default_value = "8081")]
    mock_port: u16,
    /// Relay to a real inference endpoint instead of starting the mock.
    #[clap(long, env = "UPSTREAM_URL")]
    upstream_url: Option<String>,
    #[clap(
        long,
        env = "UPSTREAM_TOKEN",
        hide_env_values = true,
        default_value = "Bearer local-dev"
    )]
    upstream_token: String,
    /// Directory holding the workspace binaries; defaults to the launcher's own directory.
    #[clap(long)]
    bin_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("relay", &self.relay_socket())
            .field("mock_port", &self.mock_port)
            .field("upstream_url", &self.upstream_url)
            .field("bin_dir", &self.bin_dir)
            .finish()
    }
}

impl Args {
    fn relay_socket(&self) -> String {
        format!("{}:{}", self.relay_address, self.relay_port)
    }

    fn upstream(&self) -> String {
        match &self.upstream_url {
            Some(url) => url.clone(),
            None => format!("http://127.0.0.1:{}/", self.mock_port),
        }
    }

    fn get_arguments(&self, program_name: ProgramName) -> Vec<String> {
        match program_name {
            ProgramName::MockUpstream => vec!["--port".to_string(), self.mock_port.to_string()],
            ProgramName::Relay => vec![
                "--address".to_string(),
                self.relay_socket(),
                "--upstream-url".to_string(),
                self.upstream(),
            ],
            ProgramName::ChatClient => {
                vec!["--relay-address".to_string(), self.relay_socket()]
            }
        }
    }

    fn bin_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.bin_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("cannot locate launcher executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .context("launcher executable has no parent directory")
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    tracing::info!("Launcher started with {:?}", args);
    let bin_dir = args.bin_dir()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    let mut children: Vec<(ProgramName, Child)> = Vec::new();

    if args.upstream_url.is_none() {
        let mock = spawn_program(&args, &bin_dir, ProgramName::MockUpstream)?;
        children.push((ProgramName::MockUpstream, mock));
        sleep(Duration::from_millis(100));
    }

    let outcome = run(&args, &bin_dir, &running, &mut children);

    for (program, child) in children.into_iter().rev() {
        if let Err(e) = terminate(program, child, GRACE_PERIOD) {
            tracing::error!("Failed to terminate {:?}: {:?}", program, e);
        }
    }

    outcome
}

fn run(
    args: &Args,
    bin_dir: &Path,
    running: &AtomicBool,
    children: &mut Vec<(ProgramName, Child)>,
) -> Result<()> {
    let relay = spawn_program(args, bin_dir, ProgramName::Relay)?;
    children.push((ProgramName::Relay, relay));
    sleep(Duration::from_millis(300));

    let chat = spawn_program(args, bin_dir, ProgramName::ChatClient)?;
    children.push((ProgramName::ChatClient, chat));

    tracing::info!("Everything is up and running. Type /quit or press Ctrl-C to terminate.");

    while running.load(Ordering::SeqCst) {
        for (program, child) in children.iter_mut() {
            if let Some(status) = child.try_wait()? {
                if *program == ProgramName::ChatClient {
                    tracing::info!("Chat client exited, shutting down");
                    return Ok(());
                }
                tracing::error!("{:?} has died, shutting down", program);
                return Err(LauncherError::Died(*program, status).into());
            }
        }
        sleep(Duration::from_millis(100));
    }

    Ok(())
}

fn spawn_program(
    args: &Args,
    bin_dir: &Path,
    program: ProgramName,
) -> Result<Child, LauncherError> {
    tracing::info!("Spawning {:?}", program);

    let executable = program.get_executable(bin_dir);
    let mut command = Command::new(&executable);
    command.args(args.get_arguments(program));

    // The token travels through the environment so it stays out of process listings.
    if program != ProgramName::ChatClient {
        command.env("UPSTREAM_TOKEN", &args.upstream_token);
    }
    if std::env::var_os("RUST_LOG").is_none() {
        command.env("RUST_LOG", "warn");
    }

    command.spawn().map_err(|source| LauncherError::Spawn {
        program,
        path: executable.display().to_string(),
        source,
    })
}

fn terminate(program: ProgramName, mut process: Child, timeout: Duration) -> Result<ExitStatus> {
    if let Some(status) = process.try_wait()? {
        return Ok(status);
    }

    tracing::info!("Terminating {:?}", program);

    let terminate_time = Instant::now();
    signal::kill(Pid::from_raw(process.id() as i32), Signal::SIGTERM)?;

    tracing::info!("Waiting for {:?} to gracefully shutdown", program);

    while terminate_time.elapsed() < timeout {
        if let Some(status) = process.try_wait()? {
            tracing::info!("{:?} terminated", program);
            return Ok(status);
        }
        sleep(Duration::from_millis(100));
    }

    tracing::info!("Killing {:?}", program);

    process.kill()?;
    let exit_status = process.wait()?;

    tracing::info!("{:?} killed", program);
    Ok(exit_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_points_at_mock_by_default() {
        let args = Args::parse_from(["launcher", "--mock-port", "9001", "--relay-port", "9000"]);
        assert_eq!(
            args.get_arguments(ProgramName::Relay),
            vec![
                "--address",
                "127.0.0.1:9000",
                "--upstream-url",
                "http://127.0.0.1:9001/"
            ]
        );
        assert_eq!(
            args.get_arguments(ProgramName::MockUpstream),
            vec!["--port", "9001"]
        );
        assert_eq!(
            args.get_arguments(ProgramName::ChatClient),
            vec!["--relay-address", "127.0.0.1:9000"]
        );
    }

    #[test]
    fn explicit_upstream_replaces_mock() {
        let args = Args::parse_from([
            "launcher",
            "--upstream-url",
            "https://api-inference.huggingface.co/models/gpt2",
        ]);
        let relay_args = args.get_arguments(ProgramName::Relay);
        assert_eq!(
            relay_args.last().map(String::as_str),
            Some("https://api-inference.huggingface.co/models/gpt2")
        );
    }

    #[test]
    fn token_is_not_passed_as_argument() {
        let args = Args::parse_from(["launcher", "--upstream-token", "Bearer secret"]);
        for program in [
            ProgramName::MockUpstream,
            ProgramName::Relay,
            ProgramName::ChatClient,
        ] {
            assert!(!args
                .get_arguments(program)
                .iter()
                .any(|a| a.contains("secret")));
        }
    }

    #[test]
    fn executables_live_in_bin_dir() {
        let args = Args::parse_from(["launcher", "--bin-dir", "/opt/relay/bin"]);
        let dir = args.bin_dir().unwrap();
        assert_eq!(
            ProgramName::Relay.get_executable(&dir),
            PathBuf::from("/opt/relay/bin/relay")
        );
    }
}
