//! Registry of locally spawned tunnel runners
//!
//! One write lock guards the registry and is held across every
//! check-then-act (including the spawn and the stop grace wait), so two
//! starts of the same tunnel can never both pass the conflict check.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnelman_proto::TunnelStatus;

use crate::error::SupervisorError;
use crate::process::{ManagedChild, OsLauncher, ProcessLauncher, StopSignal};
use crate::runner_config::{RunnerConfig, RunnerConfigStore};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// What a managed runner is started from
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelLaunch {
    /// Persisted to the config store and passed with `--config`
    Config(RunnerConfig),
    /// Quick tunnel bound to a local URL; nothing is persisted
    Url(String),
}

/// Snapshot of one registry entry
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    pub name: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub status: TunnelStatus,
    pub command: Vec<String>,
    pub launch: TunnelLaunch,
}

impl ManagedProcess {
    pub fn is_active(&self) -> bool {
        self.status == TunnelStatus::Active
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: PathBuf,
    pub config_dir: PathBuf,
    /// How long a stopped runner may take to exit before it is killed
    pub grace_period: Duration,
    pub stop_signal: StopSignal,
}

impl SupervisorConfig {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("cloudflared"),
            config_dir: config_dir.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
            stop_signal: StopSignal::default(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = signal;
        self
    }
}

struct Entry {
    process: ManagedProcess,
    child: Arc<dyn ManagedChild>,
    /// Distinguishes this spawn from later ones under the same name
    generation: u64,
}

type Registry = Arc<RwLock<HashMap<String, Entry>>>;

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    store: RunnerConfigStore,
    launcher: Arc<dyn ProcessLauncher>,
    registry: Registry,
    generations: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_launcher(config, Arc::new(OsLauncher::new()))
    }

    pub fn with_launcher(config: SupervisorConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let store = RunnerConfigStore::new(config.config_dir.clone());
        Self {
            config,
            store,
            launcher,
            registry: Arc::new(RwLock::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn config_store(&self) -> &RunnerConfigStore {
        &self.store
    }

    /// Spawn a runner for `name`; fails with `Conflict` while an Active entry exists
    pub async fn start_managed(
        &self,
        name: &str,
        launch: TunnelLaunch,
        cancel: &CancellationToken,
    ) -> Result<ManagedProcess, SupervisorError> {
        let mut registry = self.registry.write().await;

        if let Some(entry) = registry.get(name) {
            if entry.process.is_active() {
                return Err(SupervisorError::Conflict {
                    name: name.to_string(),
                    pid: entry.process.pid,
                });
            }
        }

        self.spawn_locked(&mut registry, name, launch, cancel)
    }

    fn spawn_locked(
        &self,
        registry: &mut HashMap<String, Entry>,
        name: &str,
        launch: TunnelLaunch,
        cancel: &CancellationToken,
    ) -> Result<ManagedProcess, SupervisorError> {
        let args = match &launch {
            TunnelLaunch::Config(config) => {
                let path = self.store.save(name, config)?;
                vec![
                    "tunnel".to_string(),
                    "--config".to_string(),
                    path.display().to_string(),
                    "run".to_string(),
                    name.to_string(),
                ]
            }
            TunnelLaunch::Url(url) => vec![
                "tunnel".to_string(),
                "--url".to_string(),
                url.clone(),
                "run".to_string(),
                name.to_string(),
            ],
        };

        // Past this point the start runs to completion
        if cancel.is_cancelled() {
            return Err(SupervisorError::Cancelled(name.to_string()));
        }

        let child = self.launcher.launch(&self.config.program, &args)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let mut command = vec![self.config.program.display().to_string()];
        command.extend(args);

        let process = ManagedProcess {
            name: name.to_string(),
            pid: child.pid(),
            started_at: Utc::now(),
            status: TunnelStatus::Active,
            command,
            launch,
        };

        info!(name, pid = process.pid, "Started tunnel runner");

        registry.insert(
            name.to_string(),
            Entry {
                process: process.clone(),
                child: child.clone(),
                generation,
            },
        );
        Self::spawn_monitor(self.registry.clone(), name.to_string(), generation, child);

        Ok(process)
    }

    /// Record the exit of one spawn; never restarts it
    fn spawn_monitor(
        registry: Registry,
        name: String,
        generation: u64,
        child: Arc<dyn ManagedChild>,
    ) {
        tokio::spawn(async move {
            let exit = child.wait().await;

            let mut registry = registry.write().await;
            match registry.get_mut(&name) {
                Some(entry) if entry.generation == generation && entry.process.is_active() => {
                    if exit.is_success() {
                        info!(name = %name, pid = entry.process.pid, "Tunnel runner exited");
                        entry.process.status = TunnelStatus::Inactive;
                    } else {
                        warn!(name = %name, pid = entry.process.pid, ?exit, "Tunnel runner exited abnormally");
                        entry.process.status = TunnelStatus::Error;
                    }
                }
                _ => {
                    debug!(name = %name, ?exit, "Ignoring exit of stopped or replaced runner");
                }
            }
        });
    }

    /// Graceful signal, then a forced kill once the grace period runs out
    async fn terminate(&self, child: &dyn ManagedChild) -> Result<(), SupervisorError> {
        let pid = child.pid();

        if let Err(e) = child.signal(self.config.stop_signal) {
            warn!(pid, error = %e, "Graceful signal failed, killing");
            return child.force_kill().await;
        }

        match tokio::time::timeout(self.config.grace_period, child.wait()).await {
            Ok(exit) => {
                debug!(pid, ?exit, "Runner exited after graceful signal");
                Ok(())
            }
            Err(_) => {
                warn!(
                    pid,
                    grace_secs = self.config.grace_period.as_secs_f64(),
                    "Runner ignored graceful signal, killing"
                );
                child.force_kill().await
            }
        }
    }

    async fn stop_entry(&self, entry: &mut Entry) -> Result<(), SupervisorError> {
        info!(name = %entry.process.name, pid = entry.process.pid, "Stopping tunnel runner");
        let result = self.terminate(entry.child.as_ref()).await;
        // Inactive even when the kill failed; the error is still reported
        entry.process.status = TunnelStatus::Inactive;
        result
    }

    /// Stop the runner of `name`; the entry is kept as Inactive
    pub async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        self.stop_entry(entry).await
    }

    /// Stop the runner with `pid` and drop its entry
    pub async fn stop_by_pid(&self, pid: u32) -> Result<(), SupervisorError> {
        let mut registry = self.registry.write().await;
        let name = registry
            .iter()
            .find(|(_, entry)| entry.process.pid == pid)
            .map(|(name, _)| name.clone())
            .ok_or(SupervisorError::PidNotFound(pid))?;

        if let Some(entry) = registry.get_mut(&name) {
            self.stop_entry(entry).await?;
        }
        registry.remove(&name);
        Ok(())
    }

    /// Stop every runner and clear the registry
    pub async fn stop_all(&self) -> Result<(), SupervisorError> {
        let mut registry = self.registry.write().await;
        let mut errors = Vec::new();

        for (name, entry) in registry.iter_mut() {
            if !entry.process.is_active() {
                continue;
            }
            if let Err(e) = self.stop_entry(entry).await {
                errors.push(format!("{}: {}", name, e));
            }
        }
        registry.clear();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SupervisorError::StopAll(errors))
        }
    }

    /// Stop `name` and start it again from the same launch
    pub async fn restart(&self, name: &str) -> Result<ManagedProcess, SupervisorError> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        let launch = entry.process.launch.clone();
        self.stop_entry(entry).await?;
        registry.remove(name);

        self.spawn_locked(&mut registry, name, launch, &CancellationToken::new())
    }

    /// Forget a stopped entry
    pub async fn remove(&self, name: &str) -> Result<ManagedProcess, SupervisorError> {
        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.get(name) {
            if entry.process.is_active() {
                return Err(SupervisorError::StillRunning {
                    name: name.to_string(),
                    pid: entry.process.pid,
                });
            }
        }
        registry
            .remove(name)
            .map(|entry| entry.process)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    /// Drop every entry that is no longer Active; returns their names
    pub async fn cleanup_dead(&self) -> Vec<String> {
        let mut registry = self.registry.write().await;
        let dead: Vec<String> = registry
            .iter()
            .filter(|(_, entry)| !entry.process.is_active())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &dead {
            registry.remove(name);
        }
        dead
    }

    /// Status of `name`; unmanaged tunnels report Inactive
    pub async fn status(&self, name: &str) -> TunnelStatus {
        self.registry
            .read()
            .await
            .get(name)
            .map(|entry| entry.process.status)
            .unwrap_or(TunnelStatus::Inactive)
    }

    pub async fn get(&self, name: &str) -> Option<ManagedProcess> {
        self.registry
            .read()
            .await
            .get(name)
            .map(|entry| entry.process.clone())
    }

    pub async fn get_by_pid(&self, pid: u32) -> Option<ManagedProcess> {
        self.registry
            .read()
            .await
            .values()
            .find(|entry| entry.process.pid == pid)
            .map(|entry| entry.process.clone())
    }

    pub async fn snapshot(&self) -> HashMap<String, ManagedProcess> {
        self.registry
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.process.clone()))
            .collect()
    }

    /// Ask runner processes this supervisor did not spawn to exit
    ///
    /// Best effort: listing and signalling failures are only logged.
    /// Returns how many processes were signalled.
    pub async fn reconcile_orphans(&self) -> usize {
        let pids = match self.launcher.list_runner_pids().await {
            Ok(pids) => pids,
            Err(e) => {
                debug!(error = %e, "Could not list runner processes");
                return 0;
            }
        };

        let registry = self.registry.read().await;
        let known: HashSet<u32> = registry.values().map(|entry| entry.process.pid).collect();
        let own_pid = std::process::id();

        let mut signalled = 0;
        for pid in pids {
            if known.contains(&pid) || pid == own_pid {
                continue;
            }
            match self.launcher.signal_pid(pid, StopSignal::Terminate) {
                Ok(()) => {
                    info!(pid, "Signalled orphaned tunnel runner");
                    signalled += 1;
                }
                Err(e) => debug!(pid, error = %e, "Failed to signal orphaned runner"),
            }
        }
        signalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExitResult;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::watch;

    /// Child that exits when told to, optionally ignoring the graceful signal
    struct FakeChild {
        pid: u32,
        ignore_signal: bool,
        kill_fails: bool,
        signals: AtomicU32,
        killed: AtomicBool,
        exit_tx: watch::Sender<Option<ExitResult>>,
    }

    impl FakeChild {
        fn exit(&self, result: ExitResult) {
            self.exit_tx.send_replace(Some(result));
        }
    }

    #[async_trait]
    impl ManagedChild for FakeChild {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn signal(&self, _signal: StopSignal) -> Result<(), SupervisorError> {
            self.signals.fetch_add(1, Ordering::SeqCst);
            if !self.ignore_signal {
                self.exit(ExitResult::Failed { code: None });
            }
            Ok(())
        }

        async fn wait(&self) -> ExitResult {
            let mut rx = self.exit_tx.subscribe();
            let result = rx.wait_for(Option::is_some).await.unwrap().clone();
            result.unwrap()
        }

        async fn force_kill(&self) -> Result<(), SupervisorError> {
            self.killed.store(true, Ordering::SeqCst);
            if self.kill_fails {
                return Err(SupervisorError::Kill {
                    pid: self.pid,
                    reason: "Operation not permitted".to_string(),
                });
            }
            self.exit(ExitResult::Failed { code: None });
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        next_pid: AtomicU32,
        ignore_signal: AtomicBool,
        kill_fails: AtomicBool,
        children: Mutex<Vec<Arc<FakeChild>>>,
        launches: Mutex<Vec<Vec<String>>>,
        host_pids: Mutex<Vec<u32>>,
        signalled: Mutex<Vec<u32>>,
    }

    impl FakeLauncher {
        fn child(&self, index: usize) -> Arc<FakeChild> {
            self.children.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ProcessLauncher for FakeLauncher {
        fn launch(
            &self,
            _program: &Path,
            args: &[String],
        ) -> Result<Arc<dyn ManagedChild>, SupervisorError> {
            let (exit_tx, _) = watch::channel(None);
            let child = Arc::new(FakeChild {
                pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
                ignore_signal: self.ignore_signal.load(Ordering::SeqCst),
                kill_fails: self.kill_fails.load(Ordering::SeqCst),
                signals: AtomicU32::new(0),
                killed: AtomicBool::new(false),
                exit_tx,
            });
            self.children.lock().unwrap().push(child.clone());
            self.launches.lock().unwrap().push(args.to_vec());
            Ok(child)
        }

        async fn list_runner_pids(&self) -> Result<Vec<u32>, SupervisorError> {
            Ok(self.host_pids.lock().unwrap().clone())
        }

        fn signal_pid(&self, pid: u32, _signal: StopSignal) -> Result<(), SupervisorError> {
            if pid == 13 {
                return Err(SupervisorError::Signal {
                    pid,
                    reason: "No such process".to_string(),
                });
            }
            self.signalled.lock().unwrap().push(pid);
            Ok(())
        }
    }

    fn supervisor(dir: &TempDir) -> (ProcessSupervisor, Arc<FakeLauncher>) {
        let launcher = Arc::new(FakeLauncher::default());
        let config =
            SupervisorConfig::new(dir.path()).with_grace_period(Duration::from_millis(50));
        (
            ProcessSupervisor::with_launcher(config, launcher.clone()),
            launcher,
        )
    }

    fn quick(url: &str) -> TunnelLaunch {
        TunnelLaunch::Url(url.to_string())
    }

    /// Let the monitor task take the lock and record an exit
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_double_start_conflicts() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();

        let first = supervisor
            .start_managed("t1", quick("http://localhost:8080"), &cancel)
            .await
            .unwrap();
        assert_eq!(first.status, TunnelStatus::Active);

        let err = supervisor
            .start_managed("t1", quick("http://localhost:8080"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SupervisorError::Conflict {
                name: "t1".to_string(),
                pid: first.pid
            }
        );

        assert_eq!(supervisor.snapshot().await.len(), 1);
        assert_eq!(launcher.launches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_launch_arguments() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();

        supervisor
            .start_managed("quick", quick("http://localhost:3000"), &cancel)
            .await
            .unwrap();

        let config = RunnerConfig::catch_all_only("abc", dir.path());
        let managed = supervisor
            .start_managed("blog", TunnelLaunch::Config(config.clone()), &cancel)
            .await
            .unwrap();

        let launches = launcher.launches.lock().unwrap().clone();
        assert_eq!(
            launches[0],
            ["tunnel", "--url", "http://localhost:3000", "run", "quick"]
        );
        let config_path = dir.path().join("blog.yml").display().to_string();
        assert_eq!(
            launches[1],
            ["tunnel", "--config", config_path.as_str(), "run", "blog"]
        );
        assert_eq!(managed.command[0], "cloudflared");
        assert_eq!(supervisor.config_store().load("blog").unwrap(), config);
        assert!(supervisor.config_store().load("quick").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_before_spawn() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = supervisor
            .start_managed("t1", quick("http://localhost:8080"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, SupervisorError::Cancelled("t1".to_string()));
        assert!(launcher.launches.lock().unwrap().is_empty());
        assert!(supervisor.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_graceful_stop_keeps_inactive_entry() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);

        supervisor
            .start_managed("t1", quick("http://localhost:8080"), &CancellationToken::new())
            .await
            .unwrap();
        supervisor.stop("t1").await.unwrap();
        settle().await;

        let child = launcher.child(0);
        assert_eq!(child.signals.load(Ordering::SeqCst), 1);
        assert!(!child.killed.load(Ordering::SeqCst));
        // The monitor must not turn an explicit stop into Error
        assert_eq!(supervisor.status("t1").await, TunnelStatus::Inactive);
        assert!(supervisor.get("t1").await.is_some());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        launcher.ignore_signal.store(true, Ordering::SeqCst);

        supervisor
            .start_managed("t1", quick("http://localhost:8080"), &CancellationToken::new())
            .await
            .unwrap();
        supervisor.stop("t1").await.unwrap();

        assert!(launcher.child(0).killed.load(Ordering::SeqCst));
        assert_eq!(supervisor.status("t1").await, TunnelStatus::Inactive);
    }

    #[tokio::test]
    async fn test_failed_kill_still_inactive() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        launcher.ignore_signal.store(true, Ordering::SeqCst);
        launcher.kill_fails.store(true, Ordering::SeqCst);

        supervisor
            .start_managed("t1", quick("http://localhost:8080"), &CancellationToken::new())
            .await
            .unwrap();
        let err = supervisor.stop("t1").await.unwrap_err();

        assert!(matches!(err, SupervisorError::Kill { .. }));
        assert_eq!(supervisor.status("t1").await, TunnelStatus::Inactive);
    }

    #[tokio::test]
    async fn test_monitor_records_exit() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();

        supervisor
            .start_managed("ok", quick("http://localhost:1"), &cancel)
            .await
            .unwrap();
        supervisor
            .start_managed("crash", quick("http://localhost:2"), &cancel)
            .await
            .unwrap();

        launcher.child(0).exit(ExitResult::Success);
        launcher.child(1).exit(ExitResult::Failed { code: Some(1) });
        settle().await;

        assert_eq!(supervisor.status("ok").await, TunnelStatus::Inactive);
        assert_eq!(supervisor.status("crash").await, TunnelStatus::Error);
        // No automatic restart
        assert_eq!(launcher.launches.lock().unwrap().len(), 2);

        // A dead entry may be started again
        supervisor
            .start_managed("crash", quick("http://localhost:2"), &cancel)
            .await
            .unwrap();
        assert_eq!(supervisor.status("crash").await, TunnelStatus::Active);
    }

    #[tokio::test]
    async fn test_restart_uses_same_launch() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);

        let first = supervisor
            .start_managed("t1", quick("http://localhost:8080"), &CancellationToken::new())
            .await
            .unwrap();
        let second = supervisor.restart("t1").await.unwrap();
        settle().await;

        assert_ne!(first.pid, second.pid);
        assert_eq!(second.launch, first.launch);
        // The old process's exit does not touch the new entry
        assert_eq!(supervisor.status("t1").await, TunnelStatus::Active);

        let launches = launcher.launches.lock().unwrap().clone();
        assert_eq!(launches[0], launches[1]);

        assert_eq!(
            supervisor.restart("missing").await.unwrap_err(),
            SupervisorError::NotFound("missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_remove_cleanup_and_lookup() {
        let dir = TempDir::new().unwrap();
        let (supervisor, _launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();

        let a = supervisor
            .start_managed("a", quick("http://localhost:1"), &cancel)
            .await
            .unwrap();
        supervisor
            .start_managed("b", quick("http://localhost:2"), &cancel)
            .await
            .unwrap();

        assert_eq!(supervisor.get_by_pid(a.pid).await.unwrap().name, "a");
        assert!(matches!(
            supervisor.remove("a").await,
            Err(SupervisorError::StillRunning { .. })
        ));

        supervisor.stop("a").await.unwrap();
        assert_eq!(supervisor.cleanup_dead().await, vec!["a".to_string()]);
        assert!(supervisor.get("a").await.is_none());

        supervisor.stop_by_pid(supervisor.get("b").await.unwrap().pid).await.unwrap();
        assert!(supervisor.snapshot().await.is_empty());
        assert_eq!(
            supervisor.stop_by_pid(4242).await.unwrap_err(),
            SupervisorError::PidNotFound(4242)
        );
    }

    #[tokio::test]
    async fn test_stop_all_clears_registry() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);
        let cancel = CancellationToken::new();

        for name in ["a", "b", "c"] {
            supervisor
                .start_managed(name, quick("http://localhost:1"), &cancel)
                .await
                .unwrap();
        }
        supervisor.stop_all().await.unwrap();

        assert!(supervisor.snapshot().await.is_empty());
        for i in 0..3 {
            assert_eq!(launcher.child(i).signals.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_reconcile_orphans_skips_managed() {
        let dir = TempDir::new().unwrap();
        let (supervisor, launcher) = supervisor(&dir);

        let managed = supervisor
            .start_managed("t1", quick("http://localhost:8080"), &CancellationToken::new())
            .await
            .unwrap();
        *launcher.host_pids.lock().unwrap() = vec![managed.pid, 77, 13, 78];

        assert_eq!(supervisor.reconcile_orphans().await, 2);
        assert_eq!(*launcher.signalled.lock().unwrap(), vec![77, 78]);
        assert_eq!(supervisor.status("t1").await, TunnelStatus::Active);
    }
}
