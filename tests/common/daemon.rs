//! In-process daemon harness

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use copilot_daemon::config::CommandConfig;
use copilot_daemon::control::{
    ControlContext, ControlServer, LocalListener, SUBSCRIBER_WRITE_TIMEOUT,
};
use copilot_daemon::port::{PortOwner, ProcessControl, ReclaimPolicy, SystemProcessControl};
use copilot_daemon::supervisor::{Backoff, Outcome, Supervisor};
use copilot_daemon::{DaemonConfig, LogMux};

/// Process control that reports a fake owner for a port the test holds.
///
/// Killing the owner releases the test's listener. Child trees are killed
/// for real and recorded.
#[derive(Default)]
pub struct HeldPortControl {
    owner: Option<PortOwner>,
    held: Mutex<Option<std::net::TcpListener>>,
    pub killed: Mutex<Vec<u32>>,
    pub trees: Mutex<Vec<u32>>,
}

impl HeldPortControl {
    pub fn holding(listener: std::net::TcpListener, pid: u32) -> Self {
        Self {
            owner: Some(PortOwner { pid }),
            held: Mutex::new(Some(listener)),
            killed: Mutex::new(Vec::new()),
            trees: Mutex::new(Vec::new()),
        }
    }
}

impl ProcessControl for HeldPortControl {
    fn find_listener(&self, _port: u16) -> io::Result<Option<PortOwner>> {
        Ok(self.owner)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.killed.lock().push(pid);
        self.held.lock().take();
        Ok(())
    }

    fn terminate_tree(&self, pid: u32) -> io::Result<()> {
        self.trees.lock().push(pid);
        SystemProcessControl.terminate_tree(pid)
    }
}

/// Supervisor plus control server wired the way `start` wires them
pub struct TestDaemon {
    dir: TempDir,
    pub endpoint: PathBuf,
    pub port: u16,
    pub mux: Arc<LogMux>,
    pub cancel: CancellationToken,
    server: JoinHandle<()>,
    supervisor: JoinHandle<copilot_daemon::Result<Outcome>>,
}

impl TestDaemon {
    /// Start a daemon supervising `sh -c script` on `port`
    pub fn start(
        script: &str,
        port: u16,
        configure: impl FnOnce(&mut DaemonConfig),
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let endpoint = dir.path().join("copilot-daemon.sock");

        let mut config = DaemonConfig::default();
        config.port = port;
        config.command = CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        };
        configure(&mut config);

        let mux = Arc::new(
            LogMux::open(&dir.path().join("logs/copilot-daemon.log"), false).expect("log sink"),
        );
        let cancel = CancellationToken::new();

        let mut supervisor = Supervisor::new(&config, Arc::clone(&mux), cancel.clone())
            .with_process_control(control)
            .with_backoff(Backoff::new(
                Duration::from_millis(20),
                Duration::from_millis(100),
                config.backoff.healthy_after(),
            ))
            .with_reclaim_policy(ReclaimPolicy {
                attempts: 10,
                interval: Duration::from_millis(20),
                probe_timeout: Duration::from_millis(200),
            });

        let ctx = Arc::new(ControlContext {
            port: supervisor.port(),
            started_at: supervisor.started_at(),
            version: copilot_daemon::VERSION.to_string(),
            cancel: cancel.clone(),
            subscribers: Arc::clone(mux.subscribers()),
            probe_timeout: Duration::from_millis(200),
            log_write_timeout: SUBSCRIBER_WRITE_TIMEOUT,
        });
        let listener = LocalListener::bind(&endpoint).expect("bind control socket");
        let server = tokio::spawn(ControlServer::new(listener, ctx).serve());
        let supervisor = tokio::spawn(async move { supervisor.run().await });

        Self {
            dir,
            endpoint,
            port,
            mux,
            cancel,
            server,
            supervisor,
        }
    }

    pub fn log_contents(&self) -> String {
        std::fs::read_to_string(self.mux.path()).unwrap_or_default()
    }

    /// Wait for the supervisor and server to finish on their own.
    ///
    /// Call at most once; the scratch directory stays until drop.
    pub async fn join(&mut self) -> Outcome {
        let outcome = tokio::time::timeout(Duration::from_secs(10), &mut self.supervisor)
            .await
            .expect("supervisor finished in time")
            .expect("supervisor task")
            .expect("supervisor result");
        // Mirrors `start`: the server goes down with the supervisor
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), &mut self.server)
            .await
            .expect("server finished in time")
            .expect("server task");
        outcome
    }

    /// Cancel and wait for everything to stop
    pub async fn shutdown(&mut self) -> Outcome {
        self.cancel.cancel();
        self.join().await
    }
}
