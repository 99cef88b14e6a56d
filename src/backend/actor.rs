use super::messages::{BackendCommand, BackendEvent};
use crate::queue::{validate_url, JobId, JobOptions, JobRunner, OptionOverrides};
use crate::utils::config::{AppSettings, SettingsStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffer for commands and events between a surface and the backend
pub const BACKEND_CHANNEL_CAPACITY: usize = 100;

/// Owns the settings and the job runner on behalf of an interactive surface.
///
/// Commands are handled one at a time; probes are spawned so a slow adapter
/// never holds up the command loop.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    runner: JobRunner,
    store: SettingsStore,
    settings: AppSettings,
}

impl BackendActor {
    pub fn new(
        runner: JobRunner,
        store: SettingsStore,
        settings: AppSettings,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        Self {
            receiver,
            sender,
            runner,
            store,
            settings,
        }
    }

    /// Start an actor on its own task and return the surface's ends of the channels
    pub fn spawn(
        runner: JobRunner,
        store: SettingsStore,
        settings: AppSettings,
    ) -> (
        mpsc::Sender<BackendCommand>,
        mpsc::Receiver<BackendEvent>,
        JoinHandle<()>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(BACKEND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(BACKEND_CHANNEL_CAPACITY);
        let actor = Self::new(runner, store, settings, command_rx, event_tx);
        let handle = tokio::spawn(actor.run());
        (command_tx, event_rx, handle)
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        self.runner
            .set_pool_size(self.settings.concurrent_downloads)
            .await;

        // Forward runner events to the surface
        let mut job_events = self.runner.subscribe().await;
        let forward_sender = self.sender.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = job_events.recv().await {
                if forward_sender.send(BackendEvent::Job(event)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::Probe { url } => self.handle_probe(url).await,
                BackendCommand::ProbePlaylist { url } => self.handle_probe_playlist(url).await,
                BackendCommand::Submit { url, overrides } => {
                    self.handle_submit(url, overrides).await;
                }
                BackendCommand::Cancel(id) => {
                    if let Err(e) = self.runner.cancel(id).await {
                        self.report(e.to_string()).await;
                    }
                    // confirmation arrives as a Finished event
                }
                BackendCommand::Retry(id) => {
                    if let Err(e) = self.runner.retry(id).await {
                        self.report(e.to_string()).await;
                    }
                }
                BackendCommand::Remove(id) => self.handle_remove(id).await,
                BackendCommand::ClearFinished => {
                    self.runner.clear_finished().await;
                }
                BackendCommand::UpdateSettings(settings) => {
                    self.handle_update_settings(settings).await;
                }
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    break;
                }
            }
        }

        forwarder.abort();
    }

    async fn handle_probe(&self, url: String) {
        // malformed URLs never reach the adapter
        let url = match validate_url(&url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Rejected probe of {:?}: {}", url, e);
                let result = Err(e);
                let _ = self.sender.send(BackendEvent::ProbeCompleted { url, result }).await;
                return;
            }
        };

        let _ = self
            .sender
            .send(BackendEvent::ProbeStarted { url: url.clone() })
            .await;

        let extractor = self.runner.extractor();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = extractor.probe(&url).await;
            if let Err(e) = &result {
                warn!("Probe of {} failed: {}", url, e);
            }
            let _ = sender.send(BackendEvent::ProbeCompleted { url, result }).await;
        });
    }

    async fn handle_probe_playlist(&self, url: String) {
        let url = match validate_url(&url) {
            Ok(url) => url,
            Err(e) => {
                let result = Err(e);
                let _ = self.sender.send(BackendEvent::PlaylistProbed { url, result }).await;
                return;
            }
        };

        let extractor = self.runner.extractor();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = extractor.probe_playlist(&url).await;
            match &result {
                Ok(listing) => debug!("{} lists {} entries", url, listing.entries.len()),
                Err(e) => warn!("Playlist analysis of {} failed: {}", url, e),
            }
            let _ = sender.send(BackendEvent::PlaylistProbed { url, result }).await;
        });
    }

    async fn handle_submit(&self, url: String, overrides: OptionOverrides) {
        let options = JobOptions::resolve(&self.settings, &overrides);
        match self.runner.submit(&url, options).await {
            Ok(handle) => debug!("Submitted job {} for {}", handle.id(), url),
            Err(e) => self.report(e.to_string()).await,
        }
    }

    async fn handle_remove(&self, id: JobId) {
        if let Err(e) = self.runner.remove(id).await {
            self.report(e.to_string()).await;
        }
    }

    async fn handle_update_settings(&mut self, settings: AppSettings) {
        let settings = settings.normalized();
        if let Err(e) = self.store.save(&settings) {
            self.report(format!("Failed to save settings: {:#}", e)).await;
            return;
        }

        self.runner.set_pool_size(settings.concurrent_downloads).await;
        self.settings = settings.clone();
        let _ = self.sender.send(BackendEvent::SettingsSaved(settings)).await;
    }

    async fn report(&self, message: String) {
        warn!("{}", message);
        let _ = self.sender.send(BackendEvent::Error(message)).await;
    }
}
