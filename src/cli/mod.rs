//! Command line control surface
//!
//! Provides an interactive shell over a [`ClusterSupervisor`]:
//! - Adding and removing nodes
//! - Listing running nodes
//! - Showing each node's role, view and open election round

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::mesh::{BroadcastTransport, ClusterSupervisor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of nodes to start with
    #[arg(short, long)]
    pub nodes: Option<usize>,

    /// Log level, overridden by RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,

    /// Seconds between heartbeats
    #[arg(long)]
    pub heartbeat_interval: Option<f64>,
}

impl Cli {
    /// Loads the configuration and applies command line overrides.
    pub fn resolve_config(&self) -> Result<SwarmConfig, SwarmError> {
        let mut config = SwarmConfig::load(self.config.as_deref())?;
        if let Some(nodes) = self.nodes {
            config.mesh.initial_nodes = nodes;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(interval) = self.heartbeat_interval {
            config.mesh.heartbeat_interval_secs = interval;
            if config.mesh.heartbeat_timeout_secs < interval {
                config.mesh.heartbeat_timeout_secs = interval * 2.0;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add,
    Remove(String),
    List,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, SwarmError> {
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some("add") => Command::Add,
        Some("remove") => match words.next() {
            Some(node_id) => Command::Remove(node_id.to_string()),
            None => return Err(SwarmError::command("Please specify a node id to remove")),
        },
        Some("list") => Command::List,
        Some("status") => Command::Status,
        Some("help") => Command::Help,
        Some("quit") | Some("exit") => Command::Quit,
        Some(other) => return Err(SwarmError::command(format!("Unknown command: {}", other))),
        None => return Err(SwarmError::command("Empty command")),
    };

    if words.next().is_some() {
        return Err(SwarmError::command("Too many arguments"));
    }
    Ok(command)
}

const HELP: &str = "Commands:
  add            start a new node
  remove <id>    stop a node
  list           list running nodes
  status         show each node's role and election state
  quit           stop all nodes and exit";

pub struct CliController {
    supervisor: ClusterSupervisor,
}

impl CliController {
    pub fn new(config: &SwarmConfig) -> Self {
        let transport = Arc::new(BroadcastTransport::new(config.mesh.channel_capacity));
        Self {
            supervisor: ClusterSupervisor::new(transport, config.mesh.clone()),
        }
    }

    pub fn supervisor(&self) -> &ClusterSupervisor {
        &self.supervisor
    }

    /// Runs one command. `Ok(None)` asks the shell to exit.
    pub async fn execute(&self, command: Command) -> Result<Option<String>, SwarmError> {
        let output = match command {
            Command::Add => {
                let node_id = self.supervisor.start_node();
                format!("Started node {}", node_id)
            }
            Command::Remove(node_id) => {
                self.supervisor.stop_node(&node_id).await?;
                format!("Stopped node {}", node_id)
            }
            Command::List => std::iter::once("Nodes:".to_string())
                .chain(
                    self.supervisor
                        .list_nodes()
                        .into_iter()
                        .map(|node_id| format!(" - {}", node_id)),
                )
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Status => self.status(),
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(None),
        };
        Ok(Some(output))
    }

    fn status(&self) -> String {
        let snapshots = self.supervisor.snapshots();
        if snapshots.is_empty() {
            return "No nodes running".to_string();
        }

        snapshots
            .iter()
            .map(|snapshot| {
                let node_id = snapshot.node_id();
                let mut line = format!(
                    "{} {:<20} peers={} candidates={} votes={}",
                    node_id,
                    snapshot.phase.to_string(),
                    snapshot.view.len().saturating_sub(1),
                    snapshot.candidates.len(),
                    snapshot.votes.len(),
                );
                let masters = snapshot.known_masters();
                if !masters.is_empty() {
                    line.push_str(&format!(" masters={}", masters.join(",")));
                }
                if let Some(stale) = self.supervisor.stale_peers(node_id) {
                    if !stale.is_empty() {
                        line.push_str(&format!(" stale={}", stale.join(",")));
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Starts the configured nodes and serves commands from stdin until
    /// `quit`, end of input or Ctrl-C.
    pub async fn run(
        &self,
        initial_nodes: usize,
        mut interrupt: mpsc::Receiver<()>,
    ) -> Result<(), SwarmError> {
        for _ in 0..initial_nodes {
            self.supervisor.start_node();
        }
        info!(nodes = initial_nodes, "Mesh started");
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("Interrupted");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("End of input");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let result = match parse_command(&line) {
                        Ok(command) => self.execute(command).await,
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(Some(output)) => println!("{}", output),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Command failed");
                            println!("{}", e);
                        }
                    }
                }
            }
        }

        self.supervisor.shutdown().await;
        info!("Mesh stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("add").unwrap(), Command::Add);
        assert_eq!(parse_command("  list ").unwrap(), Command::List);
        assert_eq!(
            parse_command("remove abc123").unwrap(),
            Command::Remove("abc123".to_string())
        );
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_command("remove"), Err(SwarmError::Command(_))));
        assert!(parse_command("dance").is_err());
        assert!(parse_command("").is_err());
        assert!(parse_command("list all").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["swarm", "--nodes", "3", "--heartbeat-interval", "30"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.yml");
        std::fs::write(&path, "logging:\n  level: debug\n").unwrap();
        let cli = Cli {
            config: Some(path),
            ..cli
        };

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.mesh.initial_nodes, 3);
        assert_eq!(config.mesh.heartbeat_interval_secs, 30.0);
        assert_eq!(config.mesh.heartbeat_timeout_secs, 60.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.yml");
        std::fs::write(&path, "mesh:\n  initial_nodes: 2\n").unwrap();

        let cli = Cli::parse_from(["swarm", "--heartbeat-interval", "1e300"]);
        let cli = Cli {
            config: Some(path),
            ..cli
        };
        assert!(matches!(cli.resolve_config(), Err(SwarmError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_commands() {
        let controller = CliController::new(&SwarmConfig::default());

        let started = controller.execute(Command::Add).await.unwrap().unwrap();
        let node_id = started.trim_start_matches("Started node ").to_string();
        assert_eq!(controller.supervisor().list_nodes(), vec![node_id.clone()]);

        let listed = controller.execute(Command::List).await.unwrap().unwrap();
        assert!(listed.contains(&node_id));

        let status = controller.execute(Command::Status).await.unwrap().unwrap();
        assert!(status.starts_with(&node_id));

        let removed = controller
            .execute(Command::Remove(node_id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed, format!("Stopped node {}", node_id));
        assert!(controller
            .execute(Command::Remove(node_id))
            .await
            .is_err());

        assert_eq!(controller.execute(Command::Quit).await.unwrap(), None);
    }
}
