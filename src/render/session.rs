//! Lifecycle management for a single renderer

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{RenderCapability, RenderConfig, RenderError, RenderedPage, RendererFactory};

/// Lifecycle state of a [`RenderSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No renderer has been launched, or the session was closed
    Idle,
    /// A renderer is live and accepting loads
    Ready,
    /// The renderer crashed or could not be relaunched; holds the reason
    Degraded(String),
    /// A restart is in progress
    Restarting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ready => write!(f, "ready"),
            Self::Degraded(reason) => write!(f, "degraded ({reason})"),
            Self::Restarting => write!(f, "restarting"),
        }
    }
}

/// Serializes renderer launches across every session in the process.
fn launch_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Owns one renderer and keeps it healthy.
///
/// Transitions: `Idle -> Ready` on [`start`](Self::start), `Ready -> Degraded`
/// on a crash, `Degraded | Ready -> Restarting -> Ready` on restart. A restart
/// that exhausts its launch attempts leaves the session `Degraded`.
pub struct RenderSession {
    factory: Arc<dyn RendererFactory>,
    config: RenderConfig,
    renderer: Option<Box<dyn RenderCapability>>,
    state: SessionState,
    loads_since_launch: usize,
    launches: usize,
}

impl RenderSession {
    /// Create an idle session
    pub fn new(factory: Arc<dyn RendererFactory>, config: RenderConfig) -> Self {
        Self {
            factory,
            config,
            renderer: None,
            state: SessionState::Idle,
            loads_since_launch: 0,
            launches: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Number of renderers launched so far
    pub fn launches(&self) -> usize {
        self.launches
    }

    /// Launch the first renderer. A failure here is fatal for the caller.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), RenderError> {
        if self.state == SessionState::Ready {
            return Ok(());
        }
        let renderer = self.launch_once().await?;
        self.renderer = Some(renderer);
        self.loads_since_launch = 0;
        self.state = SessionState::Ready;
        info!(launches = self.launches, "Render session ready");
        Ok(())
    }

    /// Load a page, restarting the renderer first when it is degraded or due
    /// for a proactive restart.
    #[instrument(skip(self))]
    pub async fn load(&mut self, url: &str) -> Result<RenderedPage, RenderError> {
        match &self.state {
            SessionState::Idle => self.start().await?,
            SessionState::Degraded(reason) => {
                debug!(%reason, "Restarting degraded session before load");
                self.restart().await?;
            }
            SessionState::Restarting => {
                return Err(RenderError::NotReady("restart in progress".to_string()));
            }
            SessionState::Ready => {
                if self.config.restart_every > 0 && self.loads_since_launch >= self.config.restart_every
                {
                    info!(loads = self.loads_since_launch, "Proactive renderer restart");
                    self.restart().await?;
                }
            }
        }

        let timeout = self.config.page_load_timeout;
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| RenderError::NotReady("no renderer".to_string()))?;

        match renderer.load(url, timeout).await {
            Ok(page) => {
                self.loads_since_launch += 1;
                Ok(page)
            }
            Err(e) if e.is_crash() => {
                warn!(error = %e, "Renderer crashed");
                self.state = SessionState::Degraded(e.to_string());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Tear down the current renderer and launch a new one, making at most
    /// `max_restart_attempts` launches.
    #[instrument(skip(self))]
    pub async fn restart(&mut self) -> Result<(), RenderError> {
        self.state = SessionState::Restarting;
        self.release().await;

        let attempts = self.config.max_restart_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.launch_once().await {
                Ok(renderer) => {
                    self.renderer = Some(renderer);
                    self.loads_since_launch = 0;
                    self.state = SessionState::Ready;
                    info!(attempt, launches = self.launches, "Renderer restarted");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Renderer relaunch failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.restart_backoff).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "restart attempts exhausted".to_string());
        self.state = SessionState::Degraded(reason.clone());
        Err(RenderError::Launch(format!(
            "gave up after {attempts} attempts: {reason}"
        )))
    }

    /// Release the renderer and return to `Idle`
    #[instrument(skip(self))]
    pub async fn close(&mut self) {
        self.release().await;
        self.state = SessionState::Idle;
    }

    async fn release(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.close().await {
                debug!(error = %e, "Error while closing renderer");
            }
        }
    }

    async fn launch_once(&mut self) -> Result<Box<dyn RenderCapability>, RenderError> {
        let _guard = launch_lock().lock().await;
        let launch = self.launches;
        self.launches += 1;
        self.factory.launch(&self.config, launch).await
    }
}
